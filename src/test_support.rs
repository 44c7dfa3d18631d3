//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::exec::{CommandOutput, CommandRunner, ExecError, render_command};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Clones share the same script and invocation log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the rendered command strings recorded so far.
    #[must_use]
    pub fn command_strings(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(CommandInvocation::command_string)
            .collect()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with stdout text.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
            });
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ExecError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Scripted runner that cancels a token while a matching command runs.
///
/// The scripted response is consumed before the token fires, so commands
/// issued by the cancellation handler see the responses queued after it.
#[derive(Clone, Debug)]
pub struct CancellingRunner {
    inner: ScriptedRunner,
    cancel: CancellationToken,
    trigger: String,
}

impl CancellingRunner {
    /// Cancels `cancel` when a command line starts with `trigger`.
    #[must_use]
    pub fn new(inner: ScriptedRunner, cancel: CancellationToken, trigger: impl Into<String>) -> Self {
        Self {
            inner,
            cancel,
            trigger: trigger.into(),
        }
    }
}

impl CommandRunner for CancellingRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        let output = self.inner.run(program, args);
        if render_command(program, args).starts_with(&self.trigger) {
            self.cancel.cancel();
        }
        output
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push((key.to_string(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Produces a minimal JSON payload matching `lxc image list --format json`.
///
/// Each entry is `(fingerprint, aliases, size)`.
#[must_use]
pub fn json_images(images: &[(&str, &[&str], u64)]) -> String {
    let items = images
        .iter()
        .map(|(fingerprint, aliases, size)| {
            let aliases_json = aliases
                .iter()
                .map(|alias| format!("{{\"name\":\"{alias}\",\"description\":\"\"}}"))
                .collect::<Vec<_>>()
                .join(",");
            format!(
                "{{\"fingerprint\":\"{fingerprint}\",\"aliases\":[{aliases_json}],\"size\":{size},\"properties\":{{}}}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("[{items}]")
}

/// Produces a minimal JSON payload matching `lxc list --format json`.
///
/// Each entry is `(name, status, ipv4)`; an empty address omits the network
/// state, as LXD does for stopped instances.
#[must_use]
pub fn json_instances(instances: &[(&str, &str, &str)]) -> String {
    let items = instances
        .iter()
        .map(|(name, status, ipv4)| {
            let state = if ipv4.is_empty() {
                String::from("null")
            } else {
                format!(
                    "{{\"network\":{{\"eth0\":{{\"addresses\":[{{\"family\":\"inet\",\"address\":\"{ipv4}\",\"scope\":\"global\"}},{{\"family\":\"inet6\",\"address\":\"fe80::1\",\"scope\":\"link\"}}]}},\"lo\":{{\"addresses\":[{{\"family\":\"inet\",\"address\":\"127.0.0.1\",\"scope\":\"local\"}}]}}}}}}"
                )
            };
            format!("{{\"name\":\"{name}\",\"status\":\"{status}\",\"state\":{state}}}")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("[{items}]")
}
