//! Records returned by hypervisor listings and the `lxc` JSON they are
//! parsed from.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::Fingerprint;

/// Image present in the hypervisor's store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageInfo {
    /// Image fingerprint.
    pub fingerprint: Fingerprint,
    /// Aliases pointing at the image.
    pub aliases: Vec<String>,
    /// Archive size in bytes.
    pub size: u64,
    /// Free-form description property, if any.
    pub description: Option<String>,
}

/// Instance known to the hypervisor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceInfo {
    /// Instance name.
    pub name: String,
    /// Status string reported by LXD (`Running`, `Stopped`, ...).
    pub status: String,
    /// Global IPv4 addresses across all interfaces.
    pub ipv4: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LxcImage {
    fingerprint: String,
    #[serde(default)]
    aliases: Vec<LxcAlias>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LxcAlias {
    name: String,
}

impl From<LxcImage> for ImageInfo {
    fn from(image: LxcImage) -> Self {
        let LxcImage {
            fingerprint,
            aliases,
            size,
            mut properties,
        } = image;
        Self {
            fingerprint: Fingerprint::new(fingerprint),
            aliases: aliases.into_iter().map(|alias| alias.name).collect(),
            size,
            description: properties.remove("description"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LxcInstance {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    state: Option<LxcInstanceState>,
}

#[derive(Debug, Default, Deserialize)]
struct LxcInstanceState {
    #[serde(default)]
    network: Option<BTreeMap<String, LxcNetwork>>,
}

#[derive(Debug, Deserialize)]
struct LxcNetwork {
    #[serde(default)]
    addresses: Vec<LxcAddress>,
}

#[derive(Debug, Deserialize)]
struct LxcAddress {
    family: String,
    address: String,
    #[serde(default)]
    scope: String,
}

impl From<LxcInstance> for InstanceInfo {
    fn from(instance: LxcInstance) -> Self {
        let ipv4 = instance
            .state
            .and_then(|state| state.network)
            .map(|networks| {
                networks
                    .into_values()
                    .flat_map(|network| network.addresses)
                    .filter(|addr| addr.family == "inet" && addr.scope == "global")
                    .map(|addr| addr.address)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: instance.name,
            status: instance.status,
            ipv4,
        }
    }
}
