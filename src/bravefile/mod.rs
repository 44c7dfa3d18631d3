//! Declarative unit descriptions ("Bravefiles").
//!
//! A Bravefile names the base image a unit is built from, the service it
//! deploys as, and ordered copy and run directives applied inside the unit.
//! Descriptions are parsed from YAML, validated once, and then passed by
//! reference through the build and deploy pipelines. Sections this model
//! does not cover, such as `packages`, are ignored.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Deserializer};

mod error;

pub use error::BravefileError;

/// Conventional file name looked up in the working directory.
pub const BRAVEFILE_NAME: &str = "Bravefile";

/// CPU limit applied when deploying without a Bravefile.
pub const DEFAULT_CPU: &str = "2";

/// Memory limit applied when deploying without a Bravefile.
pub const DEFAULT_RAM: &str = "2GB";

/// Complete description of a unit.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct UnitDescription {
    /// Image the unit starts from.
    #[serde(default)]
    pub base: Base,
    /// Service identity, networking and resources.
    #[serde(default)]
    pub service: PlatformService,
    /// Files pushed into the unit, in declared order.
    #[serde(default)]
    pub copy: Vec<CopyDirective>,
    /// Commands executed inside the unit, in declared order.
    #[serde(default)]
    pub run: Vec<RunDirective>,
}

/// Where a base image comes from.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// A public image server alias such as `images:alpine/3.18`.
    #[default]
    Public,
    /// A tarball in the local image store.
    Local,
    /// A Bravefile hosted on GitHub that is built on demand.
    #[serde(rename = "github")]
    GitHub,
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => formatter.write_str("public"),
            Self::Local => formatter.write_str("local"),
            Self::GitHub => formatter.write_str("github"),
        }
    }
}

/// Base image descriptor.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Base {
    /// Image reference, interpreted according to [`Base::location`].
    #[serde(default)]
    pub image: String,
    /// Origin of the image.
    #[serde(default)]
    pub location: Location,
}

impl Base {
    /// Base that refers to a tarball in the local image store.
    #[must_use]
    pub fn local(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            location: Location::Local,
        }
    }
}

/// Service section of a Bravefile.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct PlatformService {
    /// Unit name.
    #[serde(default)]
    pub name: String,
    /// Local image the service deploys from (`name:version` or `name-version`).
    #[serde(default)]
    pub image: String,
    /// Version stamped onto built images.
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    /// Static IPv4 address for `eth0`.
    #[serde(default, deserialize_with = "optional_ip")]
    pub ip: Option<IpAddr>,
    /// Host to unit port mappings.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Resource limits.
    #[serde(default)]
    pub resources: Resources,
}

impl PlatformService {
    /// Name of the image a build of this service produces (`name-version`).
    #[must_use]
    pub fn image_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Resource limits applied at launch.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Resources {
    /// CPU count (`limits.cpu`).
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub cpu: Option<String>,
    /// Memory limit with unit suffix (`limits.memory`), e.g. `2GB`.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub ram: Option<String>,
    /// Root disk size, e.g. `10GB`.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub disk: Option<String>,
}

/// A `hostPort:containerPort` pair.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(try_from = "String")]
pub struct PortMapping {
    /// Port opened on the host.
    pub host: u16,
    /// Port inside the unit.
    pub container: u16,
}

impl FromStr for PortMapping {
    type Err = BravefileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || BravefileError::Invalid {
            field: String::from("service.ports"),
            message: format!("expected HOST:CONTAINER, got {value:?}"),
        };
        let (host, container) = value.trim().split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            host: host.trim().parse().map_err(|_| invalid())?,
            container: container.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for PortMapping {
    type Error = BravefileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.host, self.container)
    }
}

/// Pushes a host path into the unit.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CopyDirective {
    /// Path on the host, relative to the working directory.
    pub source: String,
    /// Directory inside the unit that receives the source.
    pub target: String,
    /// Shell snippet executed after the push.
    #[serde(default)]
    pub action: Option<String>,
}

/// Executes a command inside the unit.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RunDirective {
    /// Program to execute.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Inline script content appended as the final argument.
    #[serde(default)]
    pub content: Option<String>,
}

impl RunDirective {
    /// Builds the argument vector: command, arguments, then inline content.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        if let Some(content) = self.content.as_ref().filter(|text| !text.is_empty()) {
            argv.push(content.clone());
        }
        argv
    }
}

impl UnitDescription {
    /// Parses and validates a YAML Bravefile.
    ///
    /// # Errors
    ///
    /// Returns [`BravefileError::Parse`] for malformed YAML and
    /// [`BravefileError::Invalid`] when validation fails.
    pub fn from_yaml(contents: &str) -> Result<Self, BravefileError> {
        let description: Self = serde_yaml::from_str(contents).map_err(|err| {
            BravefileError::Parse {
                message: err.to_string(),
            }
        })?;
        description.validate()?;
        Ok(description)
    }

    /// Reads and parses a Bravefile from disk.
    ///
    /// # Errors
    ///
    /// Returns [`BravefileError::Read`] when the file cannot be read, and any
    /// error from [`UnitDescription::from_yaml`].
    pub fn load(path: &Utf8Path) -> Result<Self, BravefileError> {
        let contents = read_to_string_ambient(path).map_err(|message| BravefileError::Read {
            path: path.to_path_buf(),
            message,
        })?;
        Self::from_yaml(&contents)
    }

    /// Description for deploying `image` as `name` without a Bravefile.
    ///
    /// Resources default to [`DEFAULT_CPU`] and [`DEFAULT_RAM`].
    #[must_use]
    pub fn for_image(image: impl Into<String>, name: impl Into<String>) -> Self {
        let image_ref = image.into();
        Self {
            base: Base::local(image_ref.clone()),
            service: PlatformService {
                name: name.into(),
                image: image_ref,
                resources: Resources {
                    cpu: Some(DEFAULT_CPU.to_owned()),
                    ram: Some(DEFAULT_RAM.to_owned()),
                    disk: None,
                },
                ..PlatformService::default()
            },
            copy: Vec::new(),
            run: Vec::new(),
        }
    }

    /// Base a deployment of this description launches from.
    ///
    /// GitHub bases are always honoured; otherwise the service image (the
    /// output of a previous build) is used when set, falling back to `base`.
    #[must_use]
    pub fn deployment_base(&self) -> Base {
        if self.base.location == Location::GitHub || self.service.image.trim().is_empty() {
            return self.base.clone();
        }
        Base::local(self.service.image.trim())
    }

    /// Checks the invariants the pipelines rely on.
    ///
    /// # Errors
    ///
    /// Returns [`BravefileError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), BravefileError> {
        if self.service.name.trim().is_empty() {
            return Err(BravefileError::invalid("service.name", "must not be empty"));
        }
        if !is_valid_unit_name(self.service.name.trim()) {
            return Err(BravefileError::invalid(
                "service.name",
                "must contain only ASCII letters, digits and dashes",
            ));
        }
        for (index, directive) in self.run.iter().enumerate() {
            if directive.command.trim().is_empty() {
                return Err(BravefileError::invalid(
                    &format!("run[{index}].command"),
                    "must not be empty",
                ));
            }
        }
        for (index, directive) in self.copy.iter().enumerate() {
            if directive.source.trim().is_empty() {
                return Err(BravefileError::invalid(
                    &format!("copy[{index}].source"),
                    "must not be empty",
                ));
            }
            if directive.target.trim().is_empty() {
                return Err(BravefileError::invalid(
                    &format!("copy[{index}].target"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Checks the fields a build additionally needs.
    ///
    /// # Errors
    ///
    /// Returns [`BravefileError::Invalid`] when the base image or version is
    /// missing.
    pub fn validate_for_build(&self) -> Result<(), BravefileError> {
        self.validate()?;
        if self.base.image.trim().is_empty() {
            return Err(BravefileError::invalid("base.image", "must not be empty"));
        }
        if self.service.version.trim().is_empty() {
            return Err(BravefileError::invalid("service.version", "must not be empty"));
        }
        Ok(())
    }
}

fn is_valid_unit_name(name: &str) -> bool {
    name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => format!("{value:?}"),
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(Scalar::into_string)
        .filter(|text| !text.trim().is_empty()))
}

fn optional_ip<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid IP address {text:?}"))),
    }
}

fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_str().is_empty() => (parent, Utf8Path::new(name)),
        _ => (Utf8Path::new("."), path),
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests;
