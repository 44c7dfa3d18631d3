//! LXD installed on the local machine.

use serde::Deserialize;
use tracing::debug;

use super::resources::{query, query_resources};
use super::{
    DEFAULT_STORAGE_POOL, HostBackend, HostError, HostFuture, HostInfo, UNKNOWN, os_args,
};
use crate::exec::CommandRunner;
use crate::hypervisor::DEFAULT_LXC_BIN;
use crate::remote::Remote;

#[derive(Debug, Default, Deserialize)]
struct Server {
    #[serde(default)]
    environment: ServerEnvironment,
}

#[derive(Debug, Default, Deserialize)]
struct ServerEnvironment {
    #[serde(default)]
    os_name: String,
    #[serde(default)]
    os_version: String,
    #[serde(default)]
    server_version: String,
}

/// LXD daemon reached over the local unix socket.
#[derive(Clone, Debug)]
pub struct NativeHost<R> {
    lxc_bin: String,
    storage_pool: String,
    remote: Remote,
    runner: R,
}

impl<R: CommandRunner> NativeHost<R> {
    /// Creates a host for the local daemon.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            lxc_bin: DEFAULT_LXC_BIN.to_owned(),
            storage_pool: DEFAULT_STORAGE_POOL.to_owned(),
            remote: Remote::local(),
            runner,
        }
    }

    /// Overrides the `lxc` binary.
    #[must_use]
    pub fn with_lxc_bin(mut self, lxc_bin: impl Into<String>) -> Self {
        self.lxc_bin = lxc_bin.into();
        self
    }

    /// Sets the storage pool reported by [`HostBackend::info`].
    #[must_use]
    pub fn with_storage_pool(mut self, pool: impl Into<String>) -> Self {
        self.storage_pool = pool.into();
        self
    }

    fn ensure_running_sync(&self) -> Result<(), HostError> {
        let output = self.runner.run(&self.lxc_bin, &os_args(["info"]))?;
        if output.is_success() {
            return Ok(());
        }
        Err(HostError::NotRunning {
            remote: self.remote.name.clone(),
            message: output.stderr.trim().to_owned(),
        })
    }

    fn info_sync(&self) -> Result<HostInfo, HostError> {
        let server: Server = match query(&self.runner, &self.lxc_bin, &self.remote.target("/1.0")) {
            Ok(server) => server,
            Err(HostError::CommandFailure { stderr, .. }) => {
                debug!(%stderr, "LXD daemon did not answer");
                return Ok(HostInfo::unknown(&self.remote.name, "Stopped"));
            }
            Err(err) => return Err(err),
        };
        let resources =
            query_resources(&self.runner, &self.lxc_bin, &self.remote, &self.storage_pool)?;
        let environment = server.environment;
        let mut release = format!("{} {}", environment.os_name, environment.os_version)
            .trim()
            .to_owned();
        if !environment.server_version.is_empty() {
            release = format!("{release} (LXD {})", environment.server_version)
                .trim()
                .to_owned();
        }
        Ok(HostInfo {
            name: self.remote.name.clone(),
            state: String::from("Running"),
            ipv4: UNKNOWN.to_owned(),
            release: if release.is_empty() {
                UNKNOWN.to_owned()
            } else {
                release
            },
            image_hash: UNKNOWN.to_owned(),
            load: UNKNOWN.to_owned(),
            disk: resources.disk,
            memory: resources.memory,
            cpu: resources.cpu,
        })
    }
}

impl<R> HostBackend for NativeHost<R>
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
