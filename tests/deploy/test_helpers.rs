//! Shared fixtures for deploy BDD scenarios.

use std::sync::Arc;

use bravetools::bravefile::{Base, Location, PlatformService};
use bravetools::image::{ImageResolver, ImageStore};
use bravetools::{DeployOrchestrator, DeployOutcome, UnitDescription};
use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::test_doubles::{RecordingBuilder, RecordingHypervisor, StaticFetcher};

#[derive(Clone, Debug)]
pub enum DeployResult {
    Success(DeployOutcome),
    Failure { message: String, interrupted: bool },
}

#[derive(Clone, Debug)]
pub struct DeployContext {
    pub hypervisor: RecordingHypervisor,
    pub fetcher: StaticFetcher,
    pub builder: RecordingBuilder,
    pub store: ImageStore,
    pub working_dir: Utf8PathBuf,
    pub description: UnitDescription,
    pub cancel: CancellationToken,
    pub outcome: Option<DeployResult>,
    pub(crate) _tmp: Arc<TempDir>,
}

impl DeployContext {
    pub fn orchestrator(
        &self,
    ) -> DeployOrchestrator<RecordingHypervisor, StaticFetcher, RecordingBuilder> {
        DeployOrchestrator::new(
            self.hypervisor.clone(),
            ImageResolver::new(self.store.clone(), self.fetcher.clone()),
            self.builder.clone(),
            self.working_dir.clone(),
        )
        .with_cancellation(self.cancel.clone())
    }

    pub fn touch_image(&self, stem: &str) {
        std::fs::write(self.store.root().join(format!("{stem}.tar.gz")), b"tarball")
            .unwrap_or_else(|err| panic!("write tarball {stem}: {err}"));
    }
}

#[fixture]
pub fn deploy_context() -> DeployContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 tempdir path: {}", path.display()));
    let images = root.join("images");
    let working_dir = root.join("work");
    for dir in [&images, &working_dir] {
        std::fs::create_dir_all(dir).unwrap_or_else(|err| panic!("create {dir}: {err}"));
    }

    let store = ImageStore::new(images);
    let cancel = CancellationToken::new();
    DeployContext {
        hypervisor: RecordingHypervisor::new(cancel.clone()),
        fetcher: StaticFetcher::new(),
        builder: RecordingBuilder::new(store.clone()),
        store,
        working_dir,
        description: UnitDescription::default(),
        cancel,
        outcome: None,
        _tmp: Arc::new(tmp),
    }
}

/// Unit deploying from a GitHub-hosted Bravefile.
pub fn github_unit(name: &str, repository: &str) -> UnitDescription {
    UnitDescription {
        base: Base {
            image: repository.to_owned(),
            location: Location::GitHub,
        },
        service: PlatformService {
            name: name.to_owned(),
            ..PlatformService::default()
        },
        ..UnitDescription::default()
    }
}

/// Remote Bravefile describing `name` at `version`.
pub fn remote_description(name: &str, version: &str) -> UnitDescription {
    UnitDescription {
        base: Base {
            image: String::from("alpine/3.18"),
            location: Location::Public,
        },
        service: PlatformService {
            name: name.to_owned(),
            version: version.to_owned(),
            ..PlatformService::default()
        },
        ..UnitDescription::default()
    }
}
