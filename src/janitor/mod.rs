//! Hypervisor image janitor.
//!
//! Tarballs in the local image store are the durable copy of every image;
//! images imported into the hypervisor are disposable. The janitor deletes
//! all of them around a deployment and fails if anything remains afterwards.

use thiserror::Error;
use tracing::info;

use crate::hypervisor::{Fingerprint, Hypervisor};

/// Summary of a prune.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PruneSummary {
    /// Fingerprints deleted during the prune, in listing order.
    pub deleted: Vec<Fingerprint>,
}

/// Errors returned by the janitor.
#[derive(Debug, Error)]
pub enum JanitorError<HypervisorError>
where
    HypervisorError: std::error::Error + 'static,
{
    /// Raised when the image listing fails.
    #[error("failed to access host images: {0}")]
    List(#[source] HypervisorError),
    /// Raised when an image cannot be deleted.
    #[error("failed to delete image {fingerprint}: {source}")]
    Delete {
        /// Image that could not be deleted.
        fingerprint: Fingerprint,
        /// Hypervisor error.
        #[source]
        source: HypervisorError,
    },
    /// Raised when images remain after the prune.
    #[error("images remain after prune: {message}")]
    NotClean {
        /// Human-readable description of what remains.
        message: String,
    },
}

/// Deletes every image in the hypervisor's store.
///
/// Stops at the first failed deletion. The store is listed again afterwards
/// and the prune fails if any image remains.
///
/// # Errors
///
/// Returns [`JanitorError`] when listing or deletion fails, or when images
/// remain after deletion.
pub async fn prune_images<H>(hypervisor: &H) -> Result<PruneSummary, JanitorError<H::Error>>
where
    H: Hypervisor + ?Sized,
{
    let images = hypervisor.list_images().await.map_err(JanitorError::List)?;
    let mut summary = PruneSummary::default();
    for image in images {
        hypervisor
            .delete_image(&image.fingerprint)
            .await
            .map_err(|source| JanitorError::Delete {
                fingerprint: image.fingerprint.clone(),
                source,
            })?;
        info!(fingerprint = %image.fingerprint, aliases = ?image.aliases, "deleted host image");
        summary.deleted.push(image.fingerprint);
    }

    let remaining = hypervisor.list_images().await.map_err(JanitorError::List)?;
    if !remaining.is_empty() {
        let message = remaining
            .iter()
            .map(|image| image.fingerprint.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(JanitorError::NotClean { message });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests;
