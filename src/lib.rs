//! Core library for the `brave` unit deployment tool.
//!
//! The crate drives an LXD daemon, hosted in a Multipass VM or installed
//! natively, to build images from Bravefiles and deploy them as units:
//! resolve the base image (local tarball, GitHub-hosted Bravefile or public
//! image server), launch a container, push files, run provisioning commands
//! and publish ports, cleaning up after failures and interrupts.

pub mod bravefile;
pub mod build;
pub mod config;
pub mod deploy;
pub mod exec;
pub mod host;
pub mod hypervisor;
pub mod image;
pub mod janitor;
pub mod logging;
pub mod provision;
pub mod remote;
pub mod signal;
pub mod test_support;

pub use bravefile::{BravefileError, UnitDescription};
pub use build::{BuildError, BuildOrchestrator, BuildOutcome};
pub use config::{BackendKind, ConfigError, HostConfig};
pub use deploy::{DeployError, DeployOrchestrator, DeployOutcome, DeployStage};
pub use exec::{
    CommandOutput, CommandRunner, ExecError, ProcessCommandRunner, StreamingCommandRunner,
    SubcommandStreamingRunner,
};
pub use host::{HostBackend, HostError, HostInfo, MultipassHost, NativeHost};
pub use hypervisor::{Hypervisor, LxdError, LxdHypervisor};
pub use image::{GitHubFetcher, ImageResolver, ImageStore, ResolveError};
pub use janitor::{JanitorError, PruneSummary, prune_images};
pub use remote::Remote;
