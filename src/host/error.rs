//! Errors raised while bootstrapping or inspecting the host.

use thiserror::Error;

use crate::exec::ExecError;

/// Errors raised by [`super::HostBackend`] implementations.
#[derive(Debug, Error)]
pub enum HostError {
    /// Raised when the Multipass VM does not exist or cannot be inspected.
    #[error("virtual machine {vm} is not available: {message}")]
    VmMissing {
        /// VM name.
        vm: String,
        /// Reason reported by Multipass.
        message: String,
    },
    /// Raised when the LXD daemon does not answer.
    #[error("LXD is not reachable through remote {remote}: {message}")]
    NotRunning {
        /// Remote name.
        remote: String,
        /// Reason reported by the client.
        message: String,
    },
    /// Raised when a host command exits unsuccessfully.
    #[error("{command} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Rendered command line, without secrets.
        command: String,
        /// Exit status or `unknown`.
        status_text: String,
        /// Trimmed standard error.
        stderr: String,
    },
    /// Raised when command output cannot be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Command whose output was parsed.
        resource: String,
        /// Parser error.
        message: String,
    },
    /// Raised when the HTTPS remote must be registered but no trust secret
    /// is configured.
    #[error(
        "remote {remote} is not registered and no trust secret is configured; \
         set BRAVE_TRUST_SECRET or trust_secret in brave.toml"
    )]
    MissingSecret {
        /// Remote name.
        remote: String,
    },
    /// Raised when a host command cannot be spawned.
    #[error(transparent)]
    Runner(#[from] ExecError),
}
