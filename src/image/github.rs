//! GitHub-hosted Bravefile retrieval.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use tracing::debug;

use super::{DescriptionFetcher, FetchFuture, ResolveError};
use crate::bravefile::{BRAVEFILE_NAME, UnitDescription};

/// Raw content host used to download Bravefiles.
pub const DEFAULT_GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Branch Bravefiles are read from.
pub const DEFAULT_GITHUB_BRANCH: &str = "master";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const GITHUB_PREFIX: &str = "github.com/";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Repository path of a GitHub-hosted Bravefile: `owner/repo[/subpath]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GitHubLocation {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Directory inside the repository holding the Bravefile.
    pub subpath: Option<String>,
}

impl GitHubLocation {
    /// Parses `owner/repo[/subpath]`, with an optional `github.com/` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidReference`] when the owner or repository
    /// segment is missing.
    pub fn parse(image: &str) -> Result<Self, ResolveError> {
        let trimmed = image.trim().trim_matches('/');
        let path = trimmed.strip_prefix(GITHUB_PREFIX).unwrap_or(trimmed);
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
            return Err(ResolveError::InvalidReference {
                reference: image.to_owned(),
                message: String::from("expected OWNER/REPO[/PATH]"),
            });
        };
        let rest = segments.collect::<Vec<_>>();
        Ok(Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            subpath: (!rest.is_empty()).then(|| rest.join("/")),
        })
    }

    /// URL of the raw Bravefile on `branch` under `raw_base`.
    #[must_use]
    pub fn raw_url(&self, raw_base: &str, branch: &str) -> String {
        let mut url = format!(
            "{}/{}/{}/{branch}/",
            raw_base.trim_end_matches('/'),
            self.owner,
            self.repo
        );
        if let Some(subpath) = &self.subpath {
            url.push_str(subpath);
            url.push('/');
        }
        url.push_str(BRAVEFILE_NAME);
        url
    }
}

impl fmt::Display for GitHubLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{GITHUB_PREFIX}{}/{}", self.owner, self.repo)?;
        if let Some(subpath) = &self.subpath {
            write!(formatter, "/{subpath}")?;
        }
        Ok(())
    }
}

/// Fetches Bravefiles over HTTPS from GitHub's raw content host.
#[derive(Clone, Debug)]
pub struct GitHubFetcher {
    raw_base: String,
    branch: String,
}

impl Default for GitHubFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_GITHUB_RAW_BASE, DEFAULT_GITHUB_BRANCH)
    }
}

impl GitHubFetcher {
    /// Creates a fetcher reading from `branch` under `raw_base`.
    #[must_use]
    pub fn new(raw_base: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            raw_base: raw_base.into(),
            branch: branch.into(),
        }
    }

    async fn fetch_description(
        &self,
        location: &GitHubLocation,
    ) -> Result<UnitDescription, ResolveError> {
        let url = location.raw_url(&self.raw_base, &self.branch);
        debug!(%url, "fetching remote Bravefile");
        let fetch_error = |message: String| ResolveError::Fetch {
            url: url.clone(),
            message,
        };
        let response = HTTP_CLIENT
            .get(&url)
            .send()
            .await
            .map_err(|err| fetch_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|err| fetch_error(err.to_string()))?;
        UnitDescription::from_yaml(&body).map_err(|source| ResolveError::Description {
            url: url.clone(),
            source,
        })
    }
}

impl DescriptionFetcher for GitHubFetcher {
    fn fetch<'a>(&'a self, location: &'a GitHubLocation) -> FetchFuture<'a> {
        Box::pin(self.fetch_description(location))
    }
}
