//! Unit deployment orchestrator.
//!
//! A deployment resolves the base image, imports it, launches and starts the
//! unit, applies copy and run directives, attaches proxy devices and finally
//! drops the unit's leftover storage pool. Stages run strictly in order and
//! the first failure aborts the rest. Launch and start failures compensate
//! their own artefact only; copy, run and network failures leave the unit in
//! place for inspection. Cancellation is observed before every stage and
//! raced against each in-flight stage. A stage that fails after an interrupt
//! counts as interrupted; an interrupted deployment deletes the unit and the
//! imported image.

use std::fmt;
use std::future::Future;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bravefile::UnitDescription;
use crate::hypervisor::{Fingerprint, Hypervisor, LaunchImage, LaunchRequest, ProxyDevice};
use crate::image::{DescriptionFetcher, ImageBuilder, ImageResolver, import_source};
use crate::provision::{RunPolicy, apply_copy_directives, apply_run_directives};

mod error;

pub use error::DeployError;
pub(crate) use error::append_cleanup_note;

/// Profile attached to units when none is configured.
pub const DEFAULT_PROFILE: &str = "default";

/// Pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeployStage {
    /// Locating or building the base image.
    Resolving,
    /// Importing a tarball into the hypervisor.
    Importing,
    /// Creating the unit.
    Launching,
    /// Starting the unit.
    Starting,
    /// Applying copy directives.
    Copying,
    /// Applying run directives.
    Running,
    /// Attaching proxy devices.
    Networking,
    /// Deployment finished.
    Done,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resolving => "resolving",
            Self::Importing => "importing",
            Self::Launching => "launching",
            Self::Starting => "starting",
            Self::Copying => "copying",
            Self::Running => "running",
            Self::Networking => "networking",
            Self::Done => "done",
        };
        formatter.write_str(label)
    }
}

/// Summary of a successful deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOutcome {
    /// Unit name.
    pub unit: String,
    /// Fingerprint of the imported image, when the base was a tarball.
    pub fingerprint: Option<Fingerprint>,
    /// Exit status of the last run directive, or 0 when there were none.
    pub run_status: i32,
    /// Proxy devices attached to the unit.
    pub proxies: Vec<ProxyDevice>,
}

/// Artefacts created so far, used for interrupt rollback. The unit is
/// recorded before launching so an interrupted launch is compensated too.
#[derive(Debug, Default)]
struct Progress {
    fingerprint: Option<Fingerprint>,
    unit: Option<String>,
}

/// Runs deployments against a hypervisor.
#[derive(Debug)]
pub struct DeployOrchestrator<H, F, B> {
    hypervisor: H,
    resolver: ImageResolver<F>,
    builder: B,
    profile: String,
    working_dir: Utf8PathBuf,
    cancel: CancellationToken,
}

impl<H, F, B> DeployOrchestrator<H, F, B>
where
    H: Hypervisor,
    F: DescriptionFetcher,
    B: ImageBuilder,
{
    /// Creates an orchestrator. Copy sources are resolved against
    /// `working_dir`.
    #[must_use]
    pub fn new(
        hypervisor: H,
        resolver: ImageResolver<F>,
        builder: B,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            hypervisor,
            resolver,
            builder,
            profile: DEFAULT_PROFILE.to_owned(),
            working_dir: working_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the profile attached to launched units.
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

    /// Hypervisor the orchestrator drives.
    #[must_use]
    pub const fn hypervisor(&self) -> &H {
        &self.hypervisor
    }

    /// Directory copy sources are resolved against.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// Deploys `description` as a new unit.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] naming the failed stage. An interrupt yields
    /// [`DeployError::Interrupted`] after the unit and imported image have
    /// been deleted.
    pub async fn deploy(
        &self,
        description: &UnitDescription,
    ) -> Result<DeployOutcome, DeployError<H::Error>> {
        description.validate()?;
        let unit = description.service.name.trim();
        let mut progress = Progress::default();

        let base = description.deployment_base();
        let source = self
            .guarded(DeployStage::Resolving, &progress, async {
                self.resolver
                    .locate(&base, &self.builder)
                    .await
                    .map_err(DeployError::Resolve)
            })
            .await?;

        let (image, fingerprint) = self
            .guarded(DeployStage::Importing, &progress, async {
                import_source(&self.hypervisor, &source)
                    .await
                    .map_err(DeployError::Import)
            })
            .await?;
        progress.fingerprint = fingerprint;
        progress.unit = Some(unit.to_owned());

        let request = self.launch_request(description, image);
        self.guarded(
            DeployStage::Launching,
            &progress,
            self.launch_or_delete_image(&request, progress.fingerprint.as_ref()),
        )
        .await?;

        self.guarded(DeployStage::Starting, &progress, self.start_or_delete_unit(unit))
            .await?;

        self.guarded(DeployStage::Copying, &progress, async {
            apply_copy_directives(&self.hypervisor, unit, &description.copy, &self.working_dir)
                .await
                .map_err(DeployError::Copy)
        })
        .await?;

        let run_status = self
            .guarded(DeployStage::Running, &progress, async {
                apply_run_directives(&self.hypervisor, unit, &description.run, RunPolicy::ReportLast)
                    .await
                    .map_err(DeployError::Run)
            })
            .await?;

        let proxies = self
            .guarded(
                DeployStage::Networking,
                &progress,
                self.attach_proxies(unit, description),
            )
            .await?;

        self.drop_storage_pool(unit).await;
        info!(unit, stage = %DeployStage::Done, run_status, "deployment finished");

        Ok(DeployOutcome {
            unit: unit.to_owned(),
            fingerprint: progress.fingerprint,
            run_status,
            proxies,
        })
    }

    /// Runs `step` unless cancellation is requested before or during it.
    ///
    /// A step that fails once cancellation has been requested is rolled back
    /// as interrupted. A step that succeeds keeps its result and the next
    /// stage observes the cancellation.
    async fn guarded<T, Fut>(
        &self,
        stage: DeployStage,
        progress: &Progress,
        step: Fut,
    ) -> Result<T, DeployError<H::Error>>
    where
        Fut: Future<Output = Result<T, DeployError<H::Error>>>,
    {
        if self.cancel.is_cancelled() {
            return Err(self.roll_back(stage, progress).await);
        }
        info!(stage = %stage, "deployment stage");
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(self.roll_back(stage, progress).await),
            result = step => result,
        };
        match result {
            Err(err) if self.cancel.is_cancelled() => {
                warn!(stage = %stage, error = %err, "stage failed after interrupt");
                Err(self.roll_back(stage, progress).await)
            }
            other => other,
        }
    }

    fn launch_request(&self, description: &UnitDescription, image: LaunchImage) -> LaunchRequest {
        let service = &description.service;
        LaunchRequest {
            name: service.name.trim().to_owned(),
            image,
            profile: self.profile.clone(),
            cpu: service.resources.cpu.clone(),
            ram: service.resources.ram.clone(),
            disk: service.resources.disk.clone(),
            ip: service.ip,
        }
    }

    async fn launch_or_delete_image(
        &self,
        request: &LaunchRequest,
        fingerprint: Option<&Fingerprint>,
    ) -> Result<(), DeployError<H::Error>> {
        let Err(err) = self.hypervisor.launch(request).await else {
            return Ok(());
        };
        let cleanup_error = match fingerprint {
            _ if self.cancel.is_cancelled() => None,
            Some(fp) => {
                warn!(unit = %request.name, fingerprint = %fp, "launch failed, deleting imported image");
                self.hypervisor.delete_image(fp).await.err()
            }
            None => None,
        };
        Err(DeployError::Launch {
            unit: request.name.clone(),
            message: append_cleanup_note(err.to_string(), cleanup_error.as_ref()),
            source: err,
        })
    }

    async fn start_or_delete_unit(&self, unit: &str) -> Result<(), DeployError<H::Error>> {
        let Err(err) = self.hypervisor.start(unit).await else {
            return Ok(());
        };
        if self.cancel.is_cancelled() {
            return Err(DeployError::Start {
                unit: unit.to_owned(),
                message: err.to_string(),
                source: err,
            });
        }
        warn!(unit, "start failed, deleting unit");
        let cleanup_error = self.hypervisor.delete_instance(unit).await.err();
        Err(DeployError::Start {
            unit: unit.to_owned(),
            message: append_cleanup_note(err.to_string(), cleanup_error.as_ref()),
            source: err,
        })
    }

    async fn attach_proxies(
        &self,
        unit: &str,
        description: &UnitDescription,
    ) -> Result<Vec<ProxyDevice>, DeployError<H::Error>> {
        let mut proxies = Vec::with_capacity(description.service.ports.len());
        for mapping in &description.service.ports {
            let device = ProxyDevice::for_port(unit, mapping);
            self.hypervisor
                .add_proxy_device(unit, &device)
                .await
                .map_err(|source| DeployError::Network {
                    device: device.name.clone(),
                    source,
                })?;
            info!(unit, device = %device.name, listen = %device.listen, "proxy attached");
            proxies.push(device);
        }
        Ok(proxies)
    }

    async fn drop_storage_pool(&self, unit: &str) {
        if let Err(err) = self.hypervisor.delete_storage_pool(unit).await {
            info!(unit, error = %err, "no storage pool to clean");
        }
    }

    async fn roll_back(&self, stage: DeployStage, progress: &Progress) -> DeployError<H::Error> {
        warn!(stage = %stage, "deployment interrupted, rolling back");
        let mut failures = Vec::new();
        if let Some(unit) = &progress.unit
            && let Err(err) = self.hypervisor.delete_instance(unit).await
        {
            // An interrupted launch may not have created the unit yet.
            if stage == DeployStage::Launching {
                info!(unit, error = %err, "no unit to delete");
            } else {
                failures.push(format!("unit {unit}: {err}"));
            }
        }
        if let Some(fingerprint) = &progress.fingerprint
            && let Err(err) = self.hypervisor.delete_image(fingerprint).await
        {
            failures.push(format!("image {fingerprint}: {err}"));
        }
        let message = if failures.is_empty() {
            String::from("rolled back")
        } else {
            format!("rollback incomplete: {}", failures.join("; "))
        };
        DeployError::Interrupted { stage, message }
    }
}
