//! Command-line interface definitions for the `brave` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use std::net::IpAddr;

use clap::{Args, Parser};

/// Top-level CLI for the `brave` binary.
#[derive(Debug, Parser)]
#[command(
    name = "brave",
    version,
    about = "Build, import and deploy Bravefile-described units on LXD",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Deploy a unit from an image or a Bravefile.
    #[command(name = "deploy", about = "Deploy a unit from an image or a Bravefile")]
    Deploy(DeployCommand),
    /// Build a Bravefile into the local image store.
    #[command(name = "build", about = "Build a Bravefile into the local image store")]
    Build(BuildCommand),
    /// List units with their status and IPv4 addresses.
    #[command(name = "units", about = "List units with their status and IPv4 addresses")]
    Units,
    /// Force-delete a unit.
    #[command(name = "remove", about = "Force-delete a unit")]
    Remove(RemoveCommand),
    /// List images in the local image store.
    #[command(name = "images", about = "List images in the local image store")]
    Images,
    /// Show host status and resource usage.
    #[command(name = "info", about = "Show host status and resource usage")]
    Info,
}

/// Arguments for `brave deploy`.
///
/// A `Bravefile` in the working directory, or one named by `--config`, takes
/// precedence over the image argument and the other flags.
#[derive(Debug, Args)]
pub(crate) struct DeployCommand {
    /// Local image (`name:version` or `name-version`) to deploy when no
    /// Bravefile is used.
    #[arg(value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Path to a Bravefile describing the unit.
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<String>,
    /// Static IPv4 address for the unit.
    #[arg(short, long, value_name = "ADDR")]
    pub(crate) ip: Option<IpAddr>,
    /// Publish a unit port on the host; may be repeated.
    #[arg(short, long = "port", value_name = "HOST:CONTAINER")]
    pub(crate) ports: Vec<String>,
    /// Name of the deployed unit.
    #[arg(short, long, value_name = "NAME")]
    pub(crate) name: Option<String>,
}

/// Arguments for `brave build`.
#[derive(Debug, Args)]
pub(crate) struct BuildCommand {
    /// Path to the Bravefile; defaults to `./Bravefile`.
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<String>,
}

/// Arguments for `brave remove`.
#[derive(Debug, Args)]
pub(crate) struct RemoveCommand {
    /// Unit to delete.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}
