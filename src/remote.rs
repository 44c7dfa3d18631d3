//! Hypervisor endpoint selection.
//!
//! A [`Remote`] names the LXD endpoint every hypervisor call targets: either
//! the local unix socket or an HTTPS endpoint exposed by the VM-manager hosted
//! daemon. One value is constructed per invocation and shared read-only.

use std::fmt;

/// Remote name the `lxc` client reserves for the local unix socket.
pub const LOCAL_REMOTE: &str = "local";

/// Transport used to reach the LXD daemon.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Local unix socket.
    Unix,
    /// HTTPS API, authenticated with a trust secret.
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => formatter.write_str("unix"),
            Self::Https => formatter.write_str("https"),
        }
    }
}

/// Endpoint and credentials for hypervisor operations.
#[derive(Clone, Eq, PartialEq)]
pub struct Remote {
    /// Name the remote is registered under in the `lxc` client.
    pub name: String,
    /// Transport used to reach the daemon.
    pub protocol: Protocol,
    /// `https://host:port` URL; empty for the local socket, which the `lxc`
    /// client resolves from its own configuration.
    pub endpoint: String,
    /// Shared trust secret for HTTPS remotes.
    pub credential: Option<String>,
}

impl Remote {
    /// Remote for the local LXD daemon socket.
    #[must_use]
    pub fn local() -> Self {
        Self {
            name: LOCAL_REMOTE.to_owned(),
            protocol: Protocol::Unix,
            endpoint: String::new(),
            credential: None,
        }
    }

    /// Remote for an HTTPS endpoint registered under `name`.
    #[must_use]
    pub fn https(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        credential: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Https,
            endpoint: endpoint.into(),
            credential,
        }
    }

    /// Qualifies an instance, image or pool name with this remote.
    #[must_use]
    pub fn target(&self, resource: &str) -> String {
        format!("{}:{resource}", self.name)
    }

    /// Addresses the remote itself (for listings and image stores).
    #[must_use]
    pub fn root(&self) -> String {
        format!("{}:", self.name)
    }

    /// Qualifies a path inside an instance, as used by `lxc file push`.
    ///
    /// The resulting path always ends with `/` so pushes land inside `dir`.
    #[must_use]
    pub fn instance_path(&self, instance: &str, dir: &str) -> String {
        let trimmed = dir.trim_matches('/');
        if trimmed.is_empty() {
            format!("{}:{instance}/", self.name)
        } else {
            format!("{}:{instance}/{trimmed}/", self.name)
        }
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Remote")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
