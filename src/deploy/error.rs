//! Errors surfaced by the deployment orchestrator.

use std::fmt::Display;

use thiserror::Error;

use super::DeployStage;
use crate::bravefile::BravefileError;
use crate::image::ResolveError;
use crate::provision::ProvisionError;

/// Errors surfaced while deploying a unit.
#[derive(Debug, Error)]
pub enum DeployError<HypervisorError>
where
    HypervisorError: std::error::Error + 'static,
{
    /// Raised when the description fails validation before any work starts.
    #[error("invalid unit description: {0}")]
    Invalid(#[from] BravefileError),
    /// Raised when the base image cannot be resolved.
    #[error("failed to resolve base image: {0}")]
    Resolve(#[source] ResolveError),
    /// Raised when importing the resolved tarball fails.
    #[error("failed to import image: {0}")]
    Import(#[source] HypervisorError),
    /// Raised when the unit cannot be created; the imported image has been
    /// deleted.
    #[error("failed to launch unit {unit}: {message}")]
    Launch {
        /// Unit name.
        unit: String,
        /// Description including any cleanup failure.
        message: String,
        /// Hypervisor error.
        #[source]
        source: HypervisorError,
    },
    /// Raised when the unit cannot be started; the unit has been deleted but
    /// the imported image is kept.
    #[error("failed to start unit {unit}: {message}")]
    Start {
        /// Unit name.
        unit: String,
        /// Description including any cleanup failure.
        message: String,
        /// Hypervisor error.
        #[source]
        source: HypervisorError,
    },
    /// Raised when a copy directive fails.
    #[error("copy stage failed: {0}")]
    Copy(#[source] ProvisionError<HypervisorError>),
    /// Raised when a run directive cannot be executed.
    #[error("run stage failed: {0}")]
    Run(#[source] ProvisionError<HypervisorError>),
    /// Raised when a proxy device cannot be attached.
    #[error("failed to add proxy device {device}: {source}")]
    Network {
        /// Device name.
        device: String,
        /// Hypervisor error.
        #[source]
        source: HypervisorError,
    },
    /// Raised when the deployment was cancelled; partial state has been
    /// rolled back.
    #[error("deployment interrupted during {stage}: {message}")]
    Interrupted {
        /// Stage that was pending or in flight.
        stage: DeployStage,
        /// Rollback summary.
        message: String,
    },
}

impl<E> DeployError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the deployment was cancelled by a signal.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

pub(crate) fn append_cleanup_note<E: Display>(message: String, cleanup_error: Option<&E>) -> String {
    if let Some(cleanup) = cleanup_error {
        format!("{message} (cleanup also failed: {cleanup})")
    } else {
        message
    }
}
