//! LXD hosted inside a Multipass VM.

use std::collections::BTreeMap;
use std::ffi::OsString;

use serde::Deserialize;
use tracing::info;

use super::resources::query_resources;
use super::{
    DEFAULT_STORAGE_POOL, HostBackend, HostError, HostFuture, HostInfo, UNKNOWN, os_args,
    run_checked,
};
use crate::exec::CommandRunner;
use crate::hypervisor::DEFAULT_LXC_BIN;
use crate::remote::Remote;

/// Default `multipass` binary name.
pub const DEFAULT_MULTIPASS_BIN: &str = "multipass";

const RUNNING: &str = "Running";
const DELETED: &str = "Deleted";

#[derive(Debug, Deserialize)]
struct InfoDocument {
    #[serde(default)]
    info: BTreeMap<String, VmDetails>,
}

#[derive(Debug, Deserialize)]
struct VmDetails {
    state: String,
    #[serde(default)]
    ipv4: Vec<String>,
    #[serde(default)]
    release: String,
    #[serde(default)]
    image_hash: String,
    #[serde(default)]
    load: Vec<f64>,
}

/// LXD daemon inside a Multipass VM, reached over HTTPS.
#[derive(Clone, Debug)]
pub struct MultipassHost<R> {
    vm: String,
    multipass_bin: String,
    lxc_bin: String,
    storage_pool: String,
    remote: Remote,
    runner: R,
}

impl<R: CommandRunner> MultipassHost<R> {
    /// Creates a host for the VM named `vm`, whose daemon is registered in
    /// the `lxc` client as `remote`.
    #[must_use]
    pub fn new(vm: impl Into<String>, remote: Remote, runner: R) -> Self {
        Self {
            vm: vm.into(),
            multipass_bin: DEFAULT_MULTIPASS_BIN.to_owned(),
            lxc_bin: DEFAULT_LXC_BIN.to_owned(),
            storage_pool: DEFAULT_STORAGE_POOL.to_owned(),
            remote,
            runner,
        }
    }

    /// Overrides the `multipass` and `lxc` binaries.
    #[must_use]
    pub fn with_binaries(mut self, multipass_bin: impl Into<String>, lxc_bin: impl Into<String>) -> Self {
        self.multipass_bin = multipass_bin.into();
        self.lxc_bin = lxc_bin.into();
        self
    }

    /// Sets the storage pool reported by [`HostBackend::info`].
    #[must_use]
    pub fn with_storage_pool(mut self, pool: impl Into<String>) -> Self {
        self.storage_pool = pool.into();
        self
    }

    fn details(&self) -> Result<VmDetails, HostError> {
        let args = os_args(["info", &self.vm, "--format", "json"]);
        let output = self.runner.run(&self.multipass_bin, &args)?;
        if !output.is_success() {
            return Err(HostError::VmMissing {
                vm: self.vm.clone(),
                message: output.stderr.trim().to_owned(),
            });
        }
        let mut document: InfoDocument =
            serde_json::from_str(&output.stdout).map_err(|err| HostError::Parse {
                resource: String::from("multipass info"),
                message: err.to_string(),
            })?;
        document.info.remove(&self.vm).ok_or_else(|| HostError::VmMissing {
            vm: self.vm.clone(),
            message: String::from("not listed by multipass info"),
        })
    }

    fn ensure_running_sync(&self) -> Result<(), HostError> {
        let details = self.details()?;
        match details.state.as_str() {
            RUNNING => {}
            DELETED => {
                return Err(HostError::VmMissing {
                    vm: self.vm.clone(),
                    message: String::from("the VM has been deleted"),
                });
            }
            state => {
                info!(vm = %self.vm, state, "starting virtual machine");
                run_checked(&self.runner, &self.multipass_bin, &os_args(["start", &self.vm]))?;
            }
        }
        self.ensure_remote()
    }

    fn ensure_remote(&self) -> Result<(), HostError> {
        let args = os_args(["remote", "list", "--format", "json"]);
        let output = run_checked(&self.runner, &self.lxc_bin, &args)?;
        let remotes: BTreeMap<String, serde_json::Value> = serde_json::from_str(&output.stdout)
            .map_err(|err| HostError::Parse {
                resource: String::from("remote list"),
                message: err.to_string(),
            })?;
        if remotes.contains_key(&self.remote.name) {
            return Ok(());
        }

        let secret = self
            .remote
            .credential
            .as_deref()
            .ok_or_else(|| HostError::MissingSecret {
                remote: self.remote.name.clone(),
            })?;
        info!(remote = %self.remote.name, endpoint = %self.remote.endpoint, "registering LXD remote");
        let mut add = os_args(["remote", "add", &self.remote.name, &self.remote.endpoint]);
        add.extend([
            OsString::from("--password"),
            OsString::from(secret),
            OsString::from("--accept-certificate"),
        ]);
        let result = self.runner.run(&self.lxc_bin, &add)?;
        if result.is_success() {
            return Ok(());
        }
        Err(HostError::CommandFailure {
            command: format!(
                "{} remote add {} {}",
                self.lxc_bin, self.remote.name, self.remote.endpoint
            ),
            status_text: result.status_text(),
            stderr: result.stderr.trim().to_owned(),
        })
    }

    fn info_sync(&self) -> Result<HostInfo, HostError> {
        let details = self.details()?;
        if details.state != RUNNING {
            return Ok(HostInfo::unknown(&self.vm, details.state));
        }
        let resources = query_resources(&self.runner, &self.lxc_bin, &self.remote, &self.storage_pool)?;
        Ok(HostInfo {
            name: self.vm.clone(),
            state: details.state,
            ipv4: or_unknown(details.ipv4.join(", ")),
            release: or_unknown(details.release),
            image_hash: or_unknown(details.image_hash),
            load: or_unknown(
                details
                    .load
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            disk: resources.disk,
            memory: resources.memory,
            cpu: resources.cpu,
        })
    }
}

impl<R> HostBackend for MultipassHost<R>
where
    R: CommandRunner + Send + Sync,
{
    fn ensure_running(&self) -> HostFuture<'_, ()> {
        Box::pin(async move { self.ensure_running_sync() })
    }

    fn remote(&self) -> &Remote {
        &self.remote
    }

    fn info(&self) -> HostFuture<'_, HostInfo> {
        Box::pin(async move { self.info_sync() })
    }
}

fn or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_owned()
    } else {
        value
    }
}
