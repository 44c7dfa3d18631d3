//! Command runner abstraction and process-backed implementations.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use super::{ExecError, render_command};

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable representation of the exit status.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        debug!(command = %render_command(program, args), "running");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| ExecError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runner that forwards child output to the terminal while capturing it.
///
/// Used for provisioning commands whose progress the operator wants to see.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        debug!(command = %render_command(program, args), "running (streaming)");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExecError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        let io_error = |err: io::Error| ExecError::Io {
            program: program.to_owned(),
            message: err.to_string(),
        };

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| io_error(io::Error::other("stdout was not captured")))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| io_error(io::Error::other("stderr was not captured")))?;

        let stderr_thread = thread::spawn(move || tee(stderr_pipe, io::stderr()));
        let stdout_result = tee(stdout_pipe, io::stdout());
        let stderr_result = stderr_thread
            .join()
            .map_err(|_| io_error(io::Error::other("stderr forwarder panicked")))?;

        let status = child.wait().map_err(io_error)?;
        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout_result.map_err(io_error)?,
            stderr: stderr_result.map_err(io_error)?,
        })
    }
}

/// Runner that streams one subcommand and captures all others.
///
/// Wraps `lxc` so provisioning output from `lxc exec` reaches the terminal
/// while JSON listings stay machine-readable.
#[derive(Clone, Debug)]
pub struct SubcommandStreamingRunner {
    subcommand: String,
}

impl SubcommandStreamingRunner {
    /// Streams invocations whose first argument is `subcommand`.
    #[must_use]
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
        }
    }
}

impl CommandRunner for SubcommandStreamingRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        let streamed = args
            .first()
            .is_some_and(|first| first.as_os_str() == self.subcommand.as_str());
        if streamed {
            StreamingCommandRunner.run(program, args)
        } else {
            ProcessCommandRunner.run(program, args)
        }
    }
}

fn tee(mut source: impl Read, mut sink: impl Write) -> io::Result<String> {
    let mut captured = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = source.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_default();
        sink.write_all(chunk)?;
        sink.flush()?;
        captured.extend_from_slice(chunk);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
