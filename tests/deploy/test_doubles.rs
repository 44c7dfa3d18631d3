//! Test doubles for the deployment orchestrator.
//!
//! Provides an in-memory hypervisor that records every call, supports
//! failure injection per operation and can raise an interrupt when a chosen
//! operation starts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bravetools::{Hypervisor, UnitDescription};
use bravetools::hypervisor::{
    ExecOutput, Fingerprint, HypervisorFuture, ImageInfo, InstanceInfo, LaunchRequest, ProxyDevice,
};
use bravetools::image::{
    BuildFuture, DescriptionFetcher, FetchFuture, GitHubLocation, ImageBuilder, ImageStore,
    ResolveError, TARBALL_EXTENSION,
};
use camino::Utf8Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Operation names used for failure injection and interrupts.
pub const OPERATIONS: &[&str] = &[
    "import",
    "delete-image",
    "launch",
    "start",
    "stop",
    "delete",
    "exec",
    "push",
    "proxy",
    "delete-pool",
    "publish",
    "export",
];

#[derive(Clone, Debug)]
pub struct RecordingHypervisor {
    state: Arc<Mutex<State>>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    failing: Vec<String>,
    interrupt_on: Option<String>,
    exec_statuses: VecDeque<i32>,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{operation} failed")]
pub struct FakeError {
    pub operation: String,
}

impl RecordingHypervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            cancel,
        }
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|err| panic!("recording hypervisor lock poisoned: {err}"));
        apply(&mut state)
    }

    pub fn fail(&self, operation: &str) {
        assert!(OPERATIONS.contains(&operation), "unknown operation {operation}");
        self.with_state(|state| state.failing.push(operation.to_owned()));
    }

    pub fn interrupt_on(&self, operation: &str) {
        assert!(OPERATIONS.contains(&operation), "unknown operation {operation}");
        self.with_state(|state| state.interrupt_on = Some(operation.to_owned()));
    }

    pub fn push_exec_status(&self, status: i32) {
        self.with_state(|state| state.exec_statuses.push_back(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn has_call(&self, call: &str) -> bool {
        self.calls().iter().any(|recorded| recorded == call)
    }

    /// Records `call` and decides how `operation` behaves.
    fn record(&self, operation: &str, call: String) -> Step {
        let (fails, interrupts) = self.with_state(|state| {
            state.calls.push(call);
            (
                state.failing.iter().any(|name| name == operation),
                state.interrupt_on.as_deref() == Some(operation),
            )
        });
        if interrupts {
            self.cancel.cancel();
            return Step::Hang;
        }
        if fails {
            return Step::Fail(FakeError {
                operation: operation.to_owned(),
            });
        }
        Step::Proceed
    }

    fn unit<'a>(&'a self, operation: &'a str, call: String) -> HypervisorFuture<'a, (), FakeError> {
        let step = self.record(operation, call);
        Box::pin(async move { step.finish(()).await })
    }
}

enum Step {
    Proceed,
    Fail(FakeError),
    Hang,
}

impl Step {
    async fn finish<T>(self, value: T) -> Result<T, FakeError> {
        match self {
            Self::Proceed => Ok(value),
            Self::Fail(err) => Err(err),
            Self::Hang => std::future::pending().await,
        }
    }
}

impl Hypervisor for RecordingHypervisor {
    type Error = FakeError;

    fn import_image<'a>(
        &'a self,
        _tarball: &'a Utf8Path,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error> {
        let step = self.record("import", format!("import {alias}"));
        let fingerprint = Fingerprint::new(format!("fp-{alias}"));
        Box::pin(async move { step.finish(fingerprint).await })
    }

    fn delete_image<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("delete-image", format!("delete-image {fingerprint}"))
    }

    fn list_images(&self) -> HypervisorFuture<'_, Vec<ImageInfo>, Self::Error> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit(
            "launch",
            format!("launch {} {}", request.name, request.image),
        )
    }

    fn start<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("start", format!("start {name}"))
    }

    fn stop<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("stop", format!("stop {name}"))
    }

    fn delete_instance<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("delete", format!("delete {name}"))
    }

    fn list_instances(&self) -> HypervisorFuture<'_, Vec<InstanceInfo>, Self::Error> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn exec<'a>(
        &'a self,
        name: &'a str,
        argv: &'a [String],
    ) -> HypervisorFuture<'a, ExecOutput, Self::Error> {
        let step = self.record("exec", format!("exec {name} {}", argv.join(" ")));
        let status = self.with_state(|state| state.exec_statuses.pop_front().unwrap_or(0));
        Box::pin(async move {
            step.finish(ExecOutput {
                status,
                ..ExecOutput::default()
            })
            .await
        })
    }

    fn push_directory<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("push", format!("push-dir {name} {} {target}", file_name(source)))
    }

    fn push_symlink<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("push", format!("push-symlink {name} {} {target}", file_name(source)))
    }

    fn push_file<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("push", format!("push-file {name} {} {target}", file_name(source)))
    }

    fn add_proxy_device<'a>(
        &'a self,
        name: &'a str,
        device: &'a ProxyDevice,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("proxy", format!("proxy {name} {}", device.name))
    }

    fn delete_storage_pool<'a>(&'a self, pool: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("delete-pool", format!("delete-pool {pool}"))
    }

    fn publish<'a>(
        &'a self,
        name: &'a str,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error> {
        let step = self.record("publish", format!("publish {name} {alias}"));
        let fingerprint = Fingerprint::new(format!("fp-{alias}"));
        Box::pin(async move { step.finish(fingerprint).await })
    }

    fn export_image<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        destination: &'a Utf8Path,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.unit("export", format!("export {fingerprint} {destination}"))
    }
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

/// Fetcher serving one fixed remote Bravefile.
#[derive(Clone, Debug)]
pub struct StaticFetcher {
    description: Arc<Mutex<UnitDescription>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            description: Arc::new(Mutex::new(UnitDescription::default())),
        }
    }

    pub fn serve(&self, description: UnitDescription) {
        *self
            .description
            .lock()
            .unwrap_or_else(|err| panic!("fetcher lock poisoned: {err}")) = description;
    }
}

impl DescriptionFetcher for StaticFetcher {
    fn fetch<'a>(&'a self, _location: &'a GitHubLocation) -> FetchFuture<'a> {
        let description = self
            .description
            .lock()
            .unwrap_or_else(|err| panic!("fetcher lock poisoned: {err}"))
            .clone();
        Box::pin(async move { Ok(description) })
    }
}

/// Builder that writes a placeholder tarball into the store.
#[derive(Clone, Debug)]
pub struct RecordingBuilder {
    store: ImageStore,
    builds: Arc<AtomicUsize>,
}

impl RecordingBuilder {
    pub fn new(store: ImageStore) -> Self {
        Self {
            store,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ImageBuilder for RecordingBuilder {
    fn build<'a>(&'a self, description: &'a UnitDescription) -> BuildFuture<'a> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let image = description.service.image_name();
        let path = self
            .store
            .root()
            .join(format!("{image}.{TARBALL_EXTENSION}"));
        Box::pin(async move {
            std::fs::write(&path, b"tarball").map_err(|err| ResolveError::Build {
                image,
                message: err.to_string(),
            })?;
            Ok(path)
        })
    }
}
