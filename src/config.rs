//! Host configuration loading via `ortho-config`.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::deploy::DEFAULT_PROFILE;
use crate::exec::expand_tilde;
use crate::host::{DEFAULT_MULTIPASS_BIN, DEFAULT_STORAGE_POOL};
use crate::hypervisor::DEFAULT_LXC_BIN;
use crate::image::{DEFAULT_GITHUB_BRANCH, DEFAULT_GITHUB_RAW_BASE};
use crate::remote::Remote;

/// Default Multipass VM hosting the LXD daemon.
pub const DEFAULT_VM_NAME: &str = "bravetools";

/// Default name of the HTTPS remote in the `lxc` client.
pub const DEFAULT_REMOTE_NAME: &str = "bravetools";

/// Default location of the local image store.
pub const DEFAULT_IMAGE_STORE: &str = "~/.bravetools/images";

/// Where the LXD daemon runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    /// Inside a Multipass VM, reached over HTTPS.
    Multipass,
    /// Natively, reached over the local socket.
    Lxd,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "multipass" => Ok(Self::Multipass),
            "lxd" => Ok(Self::Lxd),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown backend {other:?}: expected multipass or lxd; \
                 set BRAVE_BACKEND or backend in brave.toml"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multipass => formatter.write_str("multipass"),
            Self::Lxd => formatter.write_str("lxd"),
        }
    }
}

/// Host settings derived from defaults, configuration files and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BRAVE",
    discovery(
        app_name = "brave",
        env_var = "BRAVE_CONFIG_PATH",
        config_file_name = "brave.toml",
        dotfile_name = ".brave.toml",
        project_file_name = "brave.toml"
    )
)]
pub struct HostConfig {
    /// Backend hosting LXD: `multipass` or `lxd`.
    #[ortho_config(default = "multipass".to_owned())]
    pub backend: String,
    /// Multipass VM name.
    #[ortho_config(default = DEFAULT_VM_NAME.to_owned())]
    pub vm_name: String,
    /// Remote name the VM's daemon is registered under.
    #[ortho_config(default = DEFAULT_REMOTE_NAME.to_owned())]
    pub remote_name: String,
    /// HTTPS endpoint of the VM's daemon, e.g. `https://192.168.64.5:8443`.
    /// Required for the Multipass backend.
    pub remote_endpoint: Option<String>,
    /// Trust secret used to register the remote.
    pub trust_secret: Option<String>,
    /// LXD profile attached to units.
    #[ortho_config(default = DEFAULT_PROFILE.to_owned())]
    pub profile: String,
    /// Storage pool reported by `brave info`.
    #[ortho_config(default = DEFAULT_STORAGE_POOL.to_owned())]
    pub storage_pool: String,
    /// Local image store directory. Supports `~`.
    #[ortho_config(default = DEFAULT_IMAGE_STORE.to_owned())]
    pub image_store: String,
    /// Path to the `lxc` executable.
    #[ortho_config(default = DEFAULT_LXC_BIN.to_owned())]
    pub lxc_bin: String,
    /// Path to the `multipass` executable.
    #[ortho_config(default = DEFAULT_MULTIPASS_BIN.to_owned())]
    pub multipass_bin: String,
    /// Base URL for raw GitHub content.
    #[ortho_config(default = DEFAULT_GITHUB_RAW_BASE.to_owned())]
    pub github_raw_base: String,
    /// Branch GitHub-hosted Bravefiles are read from.
    #[ortho_config(default = DEFAULT_GITHUB_BRANCH.to_owned())]
    pub github_branch: String,
    /// Whether to delete hypervisor images around deployments.
    #[ortho_config(default = true)]
    pub prune_images: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to brave.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl HostConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_optional_field(
        value: Option<&str>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        match value {
            None => Ok(()),
            Some(text) => Self::require_field(text, metadata),
        }
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("brave")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Parses the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unknown backends.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.backend.parse()
    }

    /// Local image store directory with `~` expanded.
    #[must_use]
    pub fn image_store_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(self.image_store.trim()))
    }

    /// Remote every hypervisor call targets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn remote(&self) -> Result<Remote, ConfigError> {
        self.validate()?;
        match self.backend_kind()? {
            BackendKind::Lxd => Ok(Remote::local()),
            BackendKind::Multipass => {
                let endpoint = self
                    .remote_endpoint
                    .as_deref()
                    .map(str::trim)
                    .ok_or_else(|| Self::endpoint_metadata().missing())?;
                Ok(Remote::https(
                    self.remote_name.trim(),
                    endpoint,
                    self.trust_secret.clone(),
                ))
            }
        }
    }

    const fn endpoint_metadata() -> FieldMetadata {
        FieldMetadata::new(
            "LXD remote endpoint",
            "BRAVE_REMOTE_ENDPOINT",
            "remote_endpoint",
        )
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and `brave.toml` key that provide each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] for an unknown backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backend = self.backend_kind()?;
        if backend == BackendKind::Multipass {
            Self::require_field(
                &self.vm_name,
                &FieldMetadata::new("Multipass VM name", "BRAVE_VM_NAME", "vm_name"),
            )?;
            Self::require_field(
                &self.remote_name,
                &FieldMetadata::new("LXD remote name", "BRAVE_REMOTE_NAME", "remote_name"),
            )?;
            Self::require_field(
                self.remote_endpoint.as_deref().unwrap_or_default(),
                &Self::endpoint_metadata(),
            )?;
            Self::require_field(
                &self.multipass_bin,
                &FieldMetadata::new("multipass binary", "BRAVE_MULTIPASS_BIN", "multipass_bin"),
            )?;
        }
        Self::require_optional_field(
            self.trust_secret.as_deref(),
            &FieldMetadata::new("LXD trust secret", "BRAVE_TRUST_SECRET", "trust_secret"),
        )?;
        Self::require_field(
            &self.profile,
            &FieldMetadata::new("LXD profile", "BRAVE_PROFILE", "profile"),
        )?;
        Self::require_field(
            &self.storage_pool,
            &FieldMetadata::new("storage pool", "BRAVE_STORAGE_POOL", "storage_pool"),
        )?;
        Self::require_field(
            &self.image_store,
            &FieldMetadata::new("image store directory", "BRAVE_IMAGE_STORE", "image_store"),
        )?;
        Self::require_field(
            &self.lxc_bin,
            &FieldMetadata::new("lxc binary", "BRAVE_LXC_BIN", "lxc_bin"),
        )?;
        Self::require_field(
            &self.github_raw_base,
            &FieldMetadata::new(
                "GitHub raw content URL",
                "BRAVE_GITHUB_RAW_BASE",
                "github_raw_base",
            ),
        )?;
        Self::require_field(
            &self.github_branch,
            &FieldMetadata::new("GitHub branch", "BRAVE_GITHUB_BRANCH", "github_branch"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unsupported value.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
