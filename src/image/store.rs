//! Local image store: a directory of `<name>-<version>.tar.gz` tarballs.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

use super::{ImageReference, ResolveError};

/// Extension LXD appends when exporting unified images.
pub const TARBALL_EXTENSION: &str = "tar.gz";

/// A tarball found in the store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredImage {
    /// File stem (`name-version`).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Directory holding exported image tarballs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageStore {
    root: Utf8PathBuf,
}

impl ImageStore {
    /// Creates a store rooted at `root`. The directory is not touched.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Tarball path for `reference`.
    #[must_use]
    pub fn tarball_path(&self, reference: &ImageReference) -> Utf8PathBuf {
        self.root
            .join(format!("{}.{TARBALL_EXTENSION}", reference.stem()))
    }

    /// Export destination for `reference`; the hypervisor appends the
    /// archive extension.
    #[must_use]
    pub fn export_path(&self, reference: &ImageReference) -> Utf8PathBuf {
        self.root.join(reference.stem())
    }

    /// Returns `true` when the tarball for `reference` is present.
    #[must_use]
    pub fn contains(&self, reference: &ImageReference) -> bool {
        let Ok(dir) = Dir::open_ambient_dir(&self.root, ambient_authority()) else {
            return false;
        };
        dir.is_file(format!("{}.{TARBALL_EXTENSION}", reference.stem()))
    }

    /// Creates the store directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] when the directory cannot be created.
    pub fn ensure_exists(&self) -> Result<(), ResolveError> {
        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| self.store_error(&err))
    }

    /// Lists tarballs in the store, sorted by name. A missing store directory
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] when the directory cannot be read.
    pub fn list(&self) -> Result<Vec<StoredImage>, ResolveError> {
        let dir = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.store_error(&err)),
        };
        let suffix = format!(".{TARBALL_EXTENSION}");
        let mut images = Vec::new();
        for item in dir.entries().map_err(|err| self.store_error(&err))? {
            let entry = item.map_err(|err| self.store_error(&err))?;
            let file_name = entry.file_name().map_err(|err| self.store_error(&err))?;
            let Some(name) = file_name.strip_suffix(&suffix) else {
                continue;
            };
            let metadata = entry.metadata().map_err(|err| self.store_error(&err))?;
            if !metadata.is_file() {
                continue;
            }
            images.push(StoredImage {
                name: name.to_owned(),
                size: metadata.len(),
            });
        }
        images.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(images)
    }

    fn store_error(&self, err: &std::io::Error) -> ResolveError {
        ResolveError::Store {
            path: self.root.clone(),
            message: err.to_string(),
        }
    }
}
