//! Errors raised by the `lxc`-backed hypervisor.

use thiserror::Error;

use crate::exec::ExecError;

/// Errors returned by [`super::LxdHypervisor`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LxdError {
    /// Raised when `lxc` returns a non-zero exit status.
    #[error("{command} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Rendered command line.
        command: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Trimmed stderr captured from the command.
        stderr: String,
    },
    /// Raised when `lxc` output cannot be interpreted.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource being parsed (for example `image list`).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when a host path cannot be inspected before a push.
    #[error("failed to inspect {path}: {message}")]
    Source {
        /// Host path that was inspected.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the `lxc` client cannot be executed.
    #[error(transparent)]
    Runner(#[from] ExecError),
    /// Raised when the blocking task driving `lxc` panics or is cancelled.
    #[error("lxc task did not complete: {0}")]
    Task(String),
}
