//! Resource figures read through the LXD API.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{HostError, Usage, os_args, run_checked};
use crate::exec::CommandRunner;
use crate::remote::Remote;

#[derive(Debug, Deserialize)]
struct ServerResources {
    cpu: CpuResources,
    memory: Space,
}

#[derive(Debug, Deserialize)]
struct CpuResources {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct PoolResources {
    space: Space,
}

#[derive(Debug, Deserialize)]
struct Space {
    used: u64,
    total: u64,
}

/// CPU, memory and storage figures of a running daemon.
#[derive(Debug)]
pub(super) struct Resources {
    pub(super) disk: Usage,
    pub(super) memory: Usage,
    pub(super) cpu: String,
}

/// Reads host resources with `lxc query`.
pub(super) fn query_resources<R>(
    runner: &R,
    lxc_bin: &str,
    remote: &Remote,
    pool: &str,
) -> Result<Resources, HostError>
where
    R: CommandRunner + ?Sized,
{
    let server: ServerResources = query(runner, lxc_bin, &remote.target("/1.0/resources"))?;
    let storage: PoolResources = query(
        runner,
        lxc_bin,
        &remote.target(&format!("/1.0/storage-pools/{pool}/resources")),
    )?;
    Ok(Resources {
        disk: Usage::from_bytes(storage.space.used, storage.space.total),
        memory: Usage::from_bytes(server.memory.used, server.memory.total),
        cpu: server.cpu.total.to_string(),
    })
}

pub(super) fn query<R, T>(runner: &R, lxc_bin: &str, path: &str) -> Result<T, HostError>
where
    R: CommandRunner + ?Sized,
    T: DeserializeOwned,
{
    let output = run_checked(runner, lxc_bin, &os_args(["query", path]))?;
    serde_json::from_str(&output.stdout).map_err(|err| HostError::Parse {
        resource: format!("query {path}"),
        message: err.to_string(),
    })
}
