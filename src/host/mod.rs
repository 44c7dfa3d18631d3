//! Virtualisation host bootstrap and status.
//!
//! Units run on an LXD daemon that is either hosted inside a Multipass VM
//! and reached over HTTPS, or installed natively and reached over the local
//! socket. A [`HostBackend`] makes sure the daemon is reachable before any
//! hypervisor call and reports a [`HostInfo`] snapshot for `brave info`.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::exec::{CommandOutput, CommandRunner, render_command};
use crate::remote::Remote;

mod error;
mod multipass;
mod native;
mod resources;

pub use error::HostError;
pub use multipass::{DEFAULT_MULTIPASS_BIN, MultipassHost};
pub use native::NativeHost;

/// Placeholder for values that cannot be determined.
pub const UNKNOWN: &str = "Unknown";

/// Storage pool inspected for disk usage when none is configured.
pub const DEFAULT_STORAGE_POOL: &str = "default";

/// Future returned by host operations.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HostError>> + Send + 'a>>;

/// A machine hosting the LXD daemon.
pub trait HostBackend: Send + Sync {
    /// Makes the daemon reachable, starting the VM and registering the
    /// remote when needed.
    fn ensure_running(&self) -> HostFuture<'_, ()>;

    /// Remote every hypervisor call should target.
    fn remote(&self) -> &Remote;

    /// Reads a status snapshot. A host that is not running yields a
    /// snapshot with unknown resource figures rather than an error.
    fn info(&self) -> HostFuture<'_, HostInfo>;
}

/// Used and total amounts, already formatted for display.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Usage {
    /// Amount in use.
    pub used: String,
    /// Capacity.
    pub total: String,
}

impl Usage {
    /// Usage that could not be determined.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            used: UNKNOWN.to_owned(),
            total: UNKNOWN.to_owned(),
        }
    }

    /// Usage in bytes, formatted with SI units.
    #[must_use]
    pub fn from_bytes(used: u64, total: u64) -> Self {
        Self {
            used: format_bytes_si(used),
            total: format_bytes_si(total),
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} of {}", self.used, self.total)
    }
}

/// Host status snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostInfo {
    /// VM or remote name.
    pub name: String,
    /// Host state, e.g. `Running` or `Stopped`.
    pub state: String,
    /// IPv4 addresses, comma separated.
    pub ipv4: String,
    /// Operating system release.
    pub release: String,
    /// Hash of the VM image.
    pub image_hash: String,
    /// Load averages.
    pub load: String,
    /// Storage pool usage.
    pub disk: Usage,
    /// Memory usage.
    pub memory: Usage,
    /// CPU count.
    pub cpu: String,
}

impl HostInfo {
    /// Snapshot for a host whose details are unavailable.
    #[must_use]
    pub fn unknown(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            ipv4: UNKNOWN.to_owned(),
            release: UNKNOWN.to_owned(),
            image_hash: UNKNOWN.to_owned(),
            load: UNKNOWN.to_owned(),
            disk: Usage::unknown(),
            memory: Usage::unknown(),
            cpu: UNKNOWN.to_owned(),
        }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Name", self.name.clone()),
            ("State", self.state.clone()),
            ("IPv4", self.ipv4.clone()),
            ("Release", self.release.clone()),
            ("Image hash", self.image_hash.clone()),
            ("Load", self.load.clone()),
            ("Disk", self.disk.to_string()),
            ("Memory", self.memory.to_string()),
            ("CPU", self.cpu.clone()),
        ];
        for (label, value) in rows {
            writeln!(formatter, "{:<12}{value}", format!("{label}:"))?;
        }
        Ok(())
    }
}

/// Formats a byte count with decimal (SI) units and one fractional digit.
///
/// # Examples
///
/// ```
/// # use bravetools::host::format_bytes_si;
/// assert_eq!(format_bytes_si(999), "999 B");
/// assert_eq!(format_bytes_si(1_500), "1.5 kB");
/// assert_eq!(format_bytes_si(5_019_643_904), "5.0 GB");
/// ```
#[must_use]
pub fn format_bytes_si(bytes: u64) -> String {
    const STEP: u128 = 1000;
    const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

    let value = u128::from(bytes);
    if value < STEP {
        return format!("{bytes} B");
    }
    let mut divisor = STEP;
    let mut exponent = 0_usize;
    while value.checked_div(divisor).unwrap_or(0) >= STEP && exponent + 1 < PREFIXES.len() {
        divisor = divisor.saturating_mul(STEP);
        exponent += 1;
    }
    let half = divisor.checked_div(2).unwrap_or(0);
    let tenths = value
        .saturating_mul(10)
        .saturating_add(half)
        .checked_div(divisor)
        .unwrap_or(0);
    let whole = tenths.checked_div(10).unwrap_or(0);
    let fraction = tenths.checked_rem(10).unwrap_or(0);
    let prefix = PREFIXES.get(exponent).copied().unwrap_or('E');
    format!("{whole}.{fraction} {prefix}B")
}

fn run_checked<R>(runner: &R, program: &str, args: &[OsString]) -> Result<CommandOutput, HostError>
where
    R: CommandRunner + ?Sized,
{
    let output = runner.run(program, args)?;
    if output.is_success() {
        return Ok(output);
    }
    Err(HostError::CommandFailure {
        command: render_command(program, args),
        status_text: output.status_text(),
        stderr: output.stderr.trim().to_owned(),
    })
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}
