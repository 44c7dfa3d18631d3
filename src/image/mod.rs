//! Image resolution.
//!
//! Maps a Bravefile base onto something the hypervisor can launch from: a
//! tarball in the local image store (possibly produced on demand by building
//! a GitHub-hosted Bravefile) or a public image server alias.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::bravefile::{BravefileError, UnitDescription};

mod github;
mod resolver;
mod store;

pub use github::{DEFAULT_GITHUB_BRANCH, DEFAULT_GITHUB_RAW_BASE, GitHubFetcher, GitHubLocation};
pub use resolver::{ImageResolver, LaunchSource, PUBLIC_IMAGE_SERVER, import_source};
pub use store::{ImageStore, StoredImage, TARBALL_EXTENSION};

/// Future returned by description fetchers.
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UnitDescription, ResolveError>> + Send + 'a>>;

/// Future returned by image builders, resolving to the exported tarball.
pub type BuildFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Utf8PathBuf, ResolveError>> + Send + 'a>>;

/// Retrieves a remote Bravefile.
pub trait DescriptionFetcher: Send + Sync {
    /// Fetches and parses the Bravefile at `location`.
    fn fetch<'a>(&'a self, location: &'a GitHubLocation) -> FetchFuture<'a>;
}

/// Produces a local image tarball from a description.
///
/// Implemented by the build pipeline; image resolution invokes it when a
/// GitHub-hosted base has not been built locally yet.
pub trait ImageBuilder: Send + Sync {
    /// Builds `description` and returns the path of the exported tarball.
    fn build<'a>(&'a self, description: &'a UnitDescription) -> BuildFuture<'a>;
}

/// A local image reference.
///
/// `name:version` maps to the file stem `name-version`; a reference without
/// `:` is used as the stem verbatim.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ImageReference {
    stem: String,
}

impl ImageReference {
    /// Parses a local image reference.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidReference`] when the reference is empty,
    /// has an empty name or version, or contains a path separator.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bravetools::image::ImageReference;
    /// let reference = ImageReference::parse("web:1.0").expect("valid reference");
    /// assert_eq!(reference.stem(), "web-1.0");
    /// assert_eq!(ImageReference::parse("web-1.0").expect("valid").stem(), "web-1.0");
    /// ```
    pub fn parse(reference: &str) -> Result<Self, ResolveError> {
        let trimmed = reference.trim();
        let invalid = |message: &str| ResolveError::InvalidReference {
            reference: reference.to_owned(),
            message: message.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(invalid("image reference is empty"));
        }
        if trimmed.contains('/') {
            return Err(invalid("local image references cannot contain '/'"));
        }
        let stem = match trimmed.split_once(':') {
            Some((name, version)) => {
                if name.is_empty() || version.is_empty() {
                    return Err(invalid("expected NAME:VERSION"));
                }
                format!("{name}-{version}")
            }
            None => trimmed.to_owned(),
        };
        Ok(Self { stem })
    }

    /// File stem of the tarball, which also serves as the import alias.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.stem)
    }
}

/// Errors raised while resolving a base image.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResolveError {
    /// Raised when a local reference or GitHub path is malformed.
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidReference {
        /// Reference as written.
        reference: String,
        /// Description of the problem.
        message: String,
    },
    /// Raised when a local tarball is missing from the image store.
    #[error("image {reference} not found: {path} does not exist")]
    NotFound {
        /// Reference that was looked up.
        reference: String,
        /// Expected tarball path.
        path: Utf8PathBuf,
    },
    /// Raised when a remote Bravefile cannot be downloaded.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Transport or HTTP status error.
        message: String,
    },
    /// Raised when a fetched Bravefile is invalid.
    #[error("remote Bravefile at {url} is invalid: {source}")]
    Description {
        /// URL the Bravefile was fetched from.
        url: String,
        /// Underlying parse or validation error.
        #[source]
        source: BravefileError,
    },
    /// Raised when building a GitHub-hosted base fails.
    #[error("failed to build image {image}: {message}")]
    Build {
        /// Image that was being built.
        image: String,
        /// Build failure description.
        message: String,
    },
    /// Raised when the image store cannot be inspected.
    #[error("image store {path} is not accessible: {message}")]
    Store {
        /// Store directory.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}
