//! Errors surfaced by the build pipeline.

use camino::Utf8PathBuf;
use thiserror::Error;

use super::BuildStage;
use crate::bravefile::BravefileError;
use crate::deploy::append_cleanup_note;
use crate::image::ResolveError;
use crate::provision::ProvisionError;

/// Errors surfaced while building an image.
#[derive(Debug, Error)]
pub enum BuildError<HypervisorError>
where
    HypervisorError: std::error::Error + 'static,
{
    /// Raised when the description lacks fields a build needs.
    #[error("invalid unit description: {0}")]
    Invalid(#[from] BravefileError),
    /// Raised when the output tarball already exists.
    #[error("image {image} already exists at {path}; remove it to rebuild")]
    AlreadyExists {
        /// `name-version` of the image.
        image: String,
        /// Existing tarball.
        path: Utf8PathBuf,
    },
    /// Raised when the base image cannot be resolved or the store is not
    /// writable.
    #[error("failed to resolve base image: {0}")]
    Resolve(#[source] ResolveError),
    /// Raised when a hypervisor operation fails.
    #[error("build failed while {stage}: {message}")]
    Hypervisor {
        /// Stage that failed.
        stage: BuildStage,
        /// Description including any cleanup failure.
        message: String,
        /// Hypervisor error.
        #[source]
        source: HypervisorError,
    },
    /// Raised when a copy or run directive fails.
    #[error("build failed while {stage}: {message}")]
    Provision {
        /// Stage that failed.
        stage: BuildStage,
        /// Description including any cleanup failure.
        message: String,
        /// Directive error.
        #[source]
        source: ProvisionError<HypervisorError>,
    },
    /// Raised when the image was exported but build artefacts could not be
    /// removed.
    #[error("image built but cleanup failed: {message}")]
    Cleanup {
        /// Artefacts that could not be removed.
        message: String,
    },
    /// Raised when the build was cancelled; build artefacts have been
    /// removed.
    #[error("build interrupted while {stage}: {message}")]
    Interrupted {
        /// Stage that was pending or in flight.
        stage: BuildStage,
        /// Cleanup summary.
        message: String,
    },
}

impl<E> BuildError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the build was cancelled by a signal.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    pub(super) fn with_cleanup_failures(mut self, failures: &[String]) -> Self {
        if failures.is_empty() {
            return self;
        }
        let note = failures.join("; ");
        match &mut self {
            Self::Hypervisor { message, .. } | Self::Provision { message, .. } => {
                *message = append_cleanup_note(std::mem::take(message), Some(&note));
            }
            Self::Interrupted { message, .. } => {
                *message = format!("cleanup incomplete: {note}");
            }
            Self::Invalid(_)
            | Self::AlreadyExists { .. }
            | Self::Resolve(_)
            | Self::Cleanup { .. } => {}
        }
        self
    }
}
