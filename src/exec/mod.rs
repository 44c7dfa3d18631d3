//! Execution shim for external processes.
//!
//! Every interaction with the outside world (`lxc`, `multipass`) goes through
//! a [`CommandRunner`], so orchestration code can be exercised against
//! scripted runners without spawning processes.

use std::ffi::OsString;

use shell_escape::unix::escape;
use thiserror::Error;

mod runner;
mod util;

pub use runner::{
    CommandOutput, CommandRunner, ProcessCommandRunner, StreamingCommandRunner,
    SubcommandStreamingRunner,
};
pub use util::{expand_tilde, home_dir};

/// Errors raised while spawning or supervising an external process.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when output could not be collected from a running process.
    #[error("failed to collect output from {program}: {message}")]
    Io {
        /// Command whose output was being read.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Renders a program and its arguments as a shell-escaped command line.
///
/// Used for log lines and error messages only; the runners never go through
/// a shell.
#[must_use]
pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        let lossy = arg.to_string_lossy();
        rendered.push_str(escape(lossy).as_ref());
    }
    rendered
}
