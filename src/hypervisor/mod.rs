//! Hypervisor capability surface.
//!
//! The deploy and build pipelines talk to LXD exclusively through the
//! [`Hypervisor`] trait. [`LxdHypervisor`] implements it by shelling out to
//! the `lxc` client against a configured [`crate::remote::Remote`]; tests
//! substitute in-memory fakes.

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;

use camino::Utf8Path;

use crate::bravefile::PortMapping;

mod error;
mod lxd;
mod types;

pub use error::LxdError;
pub use lxd::{DEFAULT_LXC_BIN, LxdHypervisor};
pub use types::{ImageInfo, InstanceInfo};

/// Future returned by hypervisor operations.
pub type HypervisorFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Content-derived identifier of an imported or published image.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a fingerprint string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Image a new instance is created from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LaunchImage {
    /// An image already present in the hypervisor's store.
    Fingerprint(Fingerprint),
    /// An image served by a public image server, e.g. `images:alpine/3.18`.
    Remote(String),
}

impl fmt::Display for LaunchImage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fingerprint(fingerprint) => write!(formatter, "{fingerprint}"),
            Self::Remote(alias) => formatter.write_str(alias),
        }
    }
}

/// Parameters for creating an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    /// Instance name.
    pub name: String,
    /// Source image.
    pub image: LaunchImage,
    /// Profile attached to the instance.
    pub profile: String,
    /// CPU limit (`limits.cpu`).
    pub cpu: Option<String>,
    /// Memory limit (`limits.memory`).
    pub ram: Option<String>,
    /// Root disk size.
    pub disk: Option<String>,
    /// Static address for `eth0`.
    pub ip: Option<IpAddr>,
}

/// Output of a command executed inside an instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecOutput {
    /// Exit status reported by the command.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Kind of device attached to an instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    /// Socket forwarding device.
    Proxy,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy => formatter.write_str("proxy"),
        }
    }
}

/// One side of a proxy device, rendered as `tcp:ADDRESS:PORT`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SocketEndpoint {
    /// Bound or connected address.
    pub address: IpAddr,
    /// TCP port.
    pub port: u16,
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp:{}:{}", self.address, self.port)
    }
}

/// Proxy device forwarding a host port into an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProxyDevice {
    /// Device name, unique within the instance.
    pub name: String,
    /// Device type.
    pub kind: DeviceKind,
    /// Host side listener.
    pub listen: SocketEndpoint,
    /// Instance side target.
    pub connect: SocketEndpoint,
}

impl ProxyDevice {
    /// Proxy named `<unit>proxy-<host>:<container>` that listens on all host
    /// interfaces and connects to the instance's loopback address.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bravetools::bravefile::PortMapping;
    /// # use bravetools::hypervisor::ProxyDevice;
    /// let device = ProxyDevice::for_port("web", &PortMapping { host: 8080, container: 80 });
    /// assert_eq!(device.name, "webproxy-8080:80");
    /// assert_eq!(device.listen.to_string(), "tcp:0.0.0.0:8080");
    /// assert_eq!(device.connect.to_string(), "tcp:127.0.0.1:80");
    /// ```
    #[must_use]
    pub fn for_port(unit: &str, mapping: &PortMapping) -> Self {
        Self {
            name: format!("{unit}proxy-{mapping}"),
            kind: DeviceKind::Proxy,
            listen: SocketEndpoint {
                address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: mapping.host,
            },
            connect: SocketEndpoint {
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: mapping.container,
            },
        }
    }
}

/// Operations the pipelines need from an LXD-compatible hypervisor.
pub trait Hypervisor: Send + Sync {
    /// Implementation specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Imports an image tarball under `alias` and returns its fingerprint.
    fn import_image<'a>(
        &'a self,
        tarball: &'a Utf8Path,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error>;

    /// Deletes an image from the hypervisor's store.
    fn delete_image<'a>(&'a self, fingerprint: &'a Fingerprint)
    -> HypervisorFuture<'a, (), Self::Error>;

    /// Lists images in the hypervisor's store.
    fn list_images(&self) -> HypervisorFuture<'_, Vec<ImageInfo>, Self::Error>;

    /// Creates an instance without starting it.
    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> HypervisorFuture<'a, (), Self::Error>;

    /// Starts an instance.
    fn start<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error>;

    /// Stops a running instance.
    fn stop<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error>;

    /// Force-deletes an instance, stopping it first when necessary.
    fn delete_instance<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error>;

    /// Lists instances with their state and addresses.
    fn list_instances(&self) -> HypervisorFuture<'_, Vec<InstanceInfo>, Self::Error>;

    /// Executes `argv` inside the instance and returns its exit status.
    ///
    /// A non-zero status is reported through [`ExecOutput::status`], not as an
    /// error; errors are reserved for transport failures.
    fn exec<'a>(
        &'a self,
        name: &'a str,
        argv: &'a [String],
    ) -> HypervisorFuture<'a, ExecOutput, Self::Error>;

    /// Recursively pushes a host directory into `target` inside the instance.
    fn push_directory<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error>;

    /// Recreates a host symbolic link inside `target` in the instance.
    fn push_symlink<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error>;

    /// Pushes a regular host file into `target` inside the instance.
    fn push_file<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error>;

    /// Attaches a proxy device to an instance.
    fn add_proxy_device<'a>(
        &'a self,
        name: &'a str,
        device: &'a ProxyDevice,
    ) -> HypervisorFuture<'a, (), Self::Error>;

    /// Deletes a storage pool.
    fn delete_storage_pool<'a>(&'a self, pool: &'a str) -> HypervisorFuture<'a, (), Self::Error>;

    /// Publishes a stopped instance as an image aliased `alias`.
    fn publish<'a>(
        &'a self,
        name: &'a str,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error>;

    /// Exports an image to `destination`; the hypervisor appends the archive
    /// extension.
    fn export_image<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        destination: &'a Utf8Path,
    ) -> HypervisorFuture<'a, (), Self::Error>;
}
