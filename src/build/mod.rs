//! Image build pipeline.
//!
//! A build launches a throwaway unit from the Bravefile's base, provisions
//! it with the copy and run directives, publishes it as `<name>-<version>`
//! and exports the result into the local image store. The build unit, the
//! imported base image and the published image are always removed
//! afterwards, whether the build succeeded, failed or was interrupted.

use std::fmt;
use std::future::Future;

use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bravefile::UnitDescription;
use crate::deploy::DEFAULT_PROFILE;
use crate::hypervisor::{Fingerprint, Hypervisor, LaunchRequest};
use crate::image::{
    BuildFuture, DescriptionFetcher, ImageBuilder, ImageReference, ImageResolver, ResolveError,
    import_source,
};
use crate::provision::{RunPolicy, apply_copy_directives, apply_run_directives};

mod error;

pub use error::BuildError;

/// Prefix of throwaway build unit names.
pub const BUILD_UNIT_PREFIX: &str = "brave-build-";

/// Build pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildStage {
    /// Locating or building the base image.
    Resolving,
    /// Importing the base tarball.
    Importing,
    /// Creating the build unit.
    Launching,
    /// Starting the build unit.
    Starting,
    /// Applying copy directives.
    Copying,
    /// Applying run directives.
    Running,
    /// Stopping the build unit.
    Stopping,
    /// Publishing the build unit as an image.
    Publishing,
    /// Exporting the published image.
    Exporting,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resolving => "resolving",
            Self::Importing => "importing",
            Self::Launching => "launching",
            Self::Starting => "starting",
            Self::Copying => "copying",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Publishing => "publishing",
            Self::Exporting => "exporting",
        };
        formatter.write_str(label)
    }
}

/// Result of a successful build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildOutcome {
    /// `name-version` of the built image.
    pub image: String,
    /// Exported tarball in the image store.
    pub tarball: Utf8PathBuf,
}

#[derive(Debug, Default)]
struct Artefacts {
    base: Option<Fingerprint>,
    unit: Option<String>,
    published: Option<Fingerprint>,
}

/// Builds Bravefiles into image tarballs.
#[derive(Debug)]
pub struct BuildOrchestrator<H, F> {
    hypervisor: H,
    resolver: ImageResolver<F>,
    profile: String,
    working_dir: Utf8PathBuf,
    cancel: CancellationToken,
}

impl<H, F> BuildOrchestrator<H, F>
where
    H: Hypervisor,
    F: DescriptionFetcher,
{
    /// Creates a build pipeline. Copy sources are resolved against
    /// `working_dir`.
    #[must_use]
    pub fn new(hypervisor: H, resolver: ImageResolver<F>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            hypervisor,
            resolver,
            profile: DEFAULT_PROFILE.to_owned(),
            working_dir: working_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the profile attached to build units.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Observes `cancel` for interrupts.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds `description` into `<store>/<name>-<version>.tar.gz`.
    ///
    /// The first run directive exiting non-zero fails the build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::AlreadyExists`] when the tarball is present, and
    /// other [`BuildError`] variants naming the failed stage. Cleanup
    /// failures are appended to the primary error, or reported as
    /// [`BuildError::Cleanup`] when the build itself succeeded.
    pub async fn execute(
        &self,
        description: &UnitDescription,
    ) -> Result<BuildOutcome, BuildError<H::Error>> {
        description.validate_for_build()?;
        let image = description.service.image_name();
        let reference = ImageReference::parse(&image).map_err(BuildError::Resolve)?;
        let store = self.resolver.store();
        let tarball = store.tarball_path(&reference);
        if store.contains(&reference) {
            return Err(BuildError::AlreadyExists {
                image,
                path: tarball,
            });
        }
        store.ensure_exists().map_err(BuildError::Resolve)?;

        info!(%image, "building image");
        let mut artefacts = Artefacts::default();
        let result = self
            .run_pipeline(description, &reference, &mut artefacts)
            .await;
        let failures = self.clean_up(&artefacts).await;

        match result {
            Ok(()) if failures.is_empty() => {
                info!(%image, tarball = %tarball, "image built");
                Ok(BuildOutcome { image, tarball })
            }
            Ok(()) => Err(BuildError::Cleanup {
                message: failures.join("; "),
            }),
            Err(err) => Err(err.with_cleanup_failures(&failures)),
        }
    }

    async fn run_pipeline(
        &self,
        description: &UnitDescription,
        reference: &ImageReference,
        artefacts: &mut Artefacts,
    ) -> Result<(), BuildError<H::Error>> {
        let source = self
            .step(BuildStage::Resolving, async {
                self.resolver
                    .locate(&description.base, self)
                    .await
                    .map_err(BuildError::Resolve)
            })
            .await?;

        let (launch_image, base) = self
            .step(BuildStage::Importing, async {
                import_source(&self.hypervisor, &source)
                    .await
                    .map_err(|err| hypervisor_error(BuildStage::Importing, err))
            })
            .await?;
        artefacts.base = base;

        let unit = format!("{BUILD_UNIT_PREFIX}{}", Uuid::new_v4().simple());
        let resources = &description.service.resources;
        let request = LaunchRequest {
            name: unit.clone(),
            image: launch_image,
            profile: self.profile.clone(),
            cpu: resources.cpu.clone(),
            ram: resources.ram.clone(),
            disk: resources.disk.clone(),
            ip: None,
        };
        self.step(BuildStage::Launching, async {
            self.hypervisor
                .launch(&request)
                .await
                .map_err(|err| hypervisor_error(BuildStage::Launching, err))
        })
        .await?;
        artefacts.unit = Some(unit.clone());

        self.step(BuildStage::Starting, async {
            self.hypervisor
                .start(&unit)
                .await
                .map_err(|err| hypervisor_error(BuildStage::Starting, err))
        })
        .await?;

        self.step(BuildStage::Copying, async {
            apply_copy_directives(&self.hypervisor, &unit, &description.copy, &self.working_dir)
                .await
                .map_err(|err| provision_error(BuildStage::Copying, err))
        })
        .await?;

        self.step(BuildStage::Running, async {
            apply_run_directives(
                &self.hypervisor,
                &unit,
                &description.run,
                RunPolicy::HaltOnFailure,
            )
            .await
            .map_err(|err| provision_error(BuildStage::Running, err))
        })
        .await?;

        self.step(BuildStage::Stopping, async {
            self.hypervisor
                .stop(&unit)
                .await
                .map_err(|err| hypervisor_error(BuildStage::Stopping, err))
        })
        .await?;

        let published = self
            .step(BuildStage::Publishing, async {
                self.hypervisor
                    .publish(&unit, reference.stem())
                    .await
                    .map_err(|err| hypervisor_error(BuildStage::Publishing, err))
            })
            .await?;
        artefacts.published = Some(published.clone());

        let destination = self.resolver.store().export_path(reference);
        self.step(BuildStage::Exporting, async {
            self.hypervisor
                .export_image(&published, &destination)
                .await
                .map_err(|err| hypervisor_error(BuildStage::Exporting, err))
        })
        .await
    }

    async fn step<T, Fut>(&self, stage: BuildStage, step: Fut) -> Result<T, BuildError<H::Error>>
    where
        Fut: Future<Output = Result<T, BuildError<H::Error>>>,
    {
        let interrupted = || BuildError::Interrupted {
            stage,
            message: String::from("build artefacts removed"),
        };
        if self.cancel.is_cancelled() {
            return Err(interrupted());
        }
        info!(stage = %stage, "build stage");
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(interrupted()),
            result = step => result,
        };
        match result {
            Err(err) if self.cancel.is_cancelled() => {
                warn!(stage = %stage, error = %err, "build stage failed after interrupt");
                Err(interrupted())
            }
            other => other,
        }
    }

    async fn clean_up(&self, artefacts: &Artefacts) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(unit) = &artefacts.unit
            && let Err(err) = self.hypervisor.delete_instance(unit).await
        {
            warn!(%unit, error = %err, "failed to delete build unit");
            failures.push(format!("unit {unit}: {err}"));
        }
        for fingerprint in [&artefacts.base, &artefacts.published].into_iter().flatten() {
            if let Err(err) = self.hypervisor.delete_image(fingerprint).await {
                warn!(%fingerprint, error = %err, "failed to delete build image");
                failures.push(format!("image {fingerprint}: {err}"));
            }
        }
        failures
    }
}

impl<H, F> ImageBuilder for BuildOrchestrator<H, F>
where
    H: Hypervisor,
    F: DescriptionFetcher,
{
    fn build<'a>(&'a self, description: &'a UnitDescription) -> BuildFuture<'a> {
        Box::pin(async move {
            self.execute(description)
                .await
                .map(|outcome| outcome.tarball)
                .map_err(|err| ResolveError::Build {
                    image: description.service.image_name(),
                    message: err.to_string(),
                })
        })
    }
}

fn hypervisor_error<E>(stage: BuildStage, source: E) -> BuildError<E>
where
    E: std::error::Error + 'static,
{
    BuildError::Hypervisor {
        stage,
        message: source.to_string(),
        source,
    }
}

fn provision_error<E>(
    stage: BuildStage,
    source: crate::provision::ProvisionError<E>,
) -> BuildError<E>
where
    E: std::error::Error + 'static,
{
    BuildError::Provision {
        stage,
        message: source.to_string(),
        source,
    }
}
