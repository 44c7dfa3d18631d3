//! Base image resolution and import.

use camino::Utf8PathBuf;
use tracing::info;

use super::{DescriptionFetcher, GitHubLocation, ImageBuilder, ImageReference, ImageStore, ResolveError};
use crate::bravefile::{Base, Location};
use crate::hypervisor::{Fingerprint, Hypervisor, LaunchImage};

/// Remote name of the public image server in the `lxc` client.
pub const PUBLIC_IMAGE_SERVER: &str = "images";

/// What a unit is launched from once its base has been resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LaunchSource {
    /// A tarball that must be imported before launching.
    Tarball {
        /// Path of the tarball in the image store.
        path: Utf8PathBuf,
        /// Alias the image is imported under.
        alias: String,
    },
    /// An image served by a public image server.
    Remote {
        /// Fully qualified alias, e.g. `images:alpine/3.18`.
        image: String,
    },
}

/// Resolves Bravefile bases against the local store, GitHub and public
/// image servers.
#[derive(Clone, Debug)]
pub struct ImageResolver<F> {
    store: ImageStore,
    fetcher: F,
}

impl<F: DescriptionFetcher> ImageResolver<F> {
    /// Creates a resolver over `store`, fetching remote Bravefiles with
    /// `fetcher`.
    #[must_use]
    pub const fn new(store: ImageStore, fetcher: F) -> Self {
        Self { store, fetcher }
    }

    /// Local image store.
    #[must_use]
    pub const fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Resolves `base` to a launch source.
    ///
    /// Local references must already exist in the store. GitHub bases are
    /// built with `builder` unless their `<name>-<version>` tarball is
    /// already present. Public bases are launched from the image server
    /// without an import.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] for missing local tarballs,
    /// [`ResolveError::Fetch`] or [`ResolveError::Description`] when a remote
    /// Bravefile cannot be retrieved, and [`ResolveError::Build`] when the
    /// nested build fails.
    pub async fn locate<B>(&self, base: &Base, builder: &B) -> Result<LaunchSource, ResolveError>
    where
        B: ImageBuilder + ?Sized,
    {
        match base.location {
            Location::Public => Ok(LaunchSource::Remote {
                image: public_alias(&base.image)?,
            }),
            Location::Local => self.locate_local(&base.image),
            Location::GitHub => self.locate_github(&base.image, builder).await,
        }
    }

    fn locate_local(&self, image: &str) -> Result<LaunchSource, ResolveError> {
        let reference = ImageReference::parse(image)?;
        let path = self.store.tarball_path(&reference);
        if !self.store.contains(&reference) {
            return Err(ResolveError::NotFound {
                reference: image.trim().to_owned(),
                path,
            });
        }
        Ok(LaunchSource::Tarball {
            path,
            alias: reference.stem().to_owned(),
        })
    }

    async fn locate_github<B>(&self, image: &str, builder: &B) -> Result<LaunchSource, ResolveError>
    where
        B: ImageBuilder + ?Sized,
    {
        let location = GitHubLocation::parse(image)?;
        let description = self.fetcher.fetch(&location).await?;
        let reference = ImageReference::parse(&description.service.image_name())?;

        let path = if self.store.contains(&reference) {
            info!(image = %reference, "found local image, skipping GitHub build");
            self.store.tarball_path(&reference)
        } else {
            info!(image = %reference, source = %location, "building GitHub image");
            builder.build(&description).await?
        };

        Ok(LaunchSource::Tarball {
            path,
            alias: reference.stem().to_owned(),
        })
    }
}

fn public_alias(image: &str) -> Result<String, ResolveError> {
    let trimmed = image.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::InvalidReference {
            reference: image.to_owned(),
            message: String::from("public image alias is empty"),
        });
    }
    if trimmed.contains(':') {
        return Ok(trimmed.to_owned());
    }
    Ok(format!("{PUBLIC_IMAGE_SERVER}:{trimmed}"))
}

/// Makes `source` launchable on `hypervisor`.
///
/// Tarballs are imported and the new fingerprint is returned alongside the
/// launch image so callers can delete it during compensation. Public aliases
/// need no import.
///
/// # Errors
///
/// Returns the hypervisor's error when the import fails.
pub async fn import_source<H>(
    hypervisor: &H,
    source: &LaunchSource,
) -> Result<(LaunchImage, Option<Fingerprint>), H::Error>
where
    H: Hypervisor + ?Sized,
{
    match source {
        LaunchSource::Tarball { path, alias } => {
            let fingerprint = hypervisor.import_image(path, alias).await?;
            info!(%alias, %fingerprint, "imported image");
            Ok((
                LaunchImage::Fingerprint(fingerprint.clone()),
                Some(fingerprint),
            ))
        }
        LaunchSource::Remote { image } => Ok((LaunchImage::Remote(image.clone()), None)),
    }
}
