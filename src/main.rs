//! Binary entry point for the `brave` CLI.

use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bravetools::bravefile::{BRAVEFILE_NAME, PortMapping};
use bravetools::exec::expand_tilde;
use bravetools::host::format_bytes_si;
use bravetools::signal::{INTERRUPTED_EXIT_CODE, spawn_interrupt_listener};
use bravetools::{
    BackendKind, BravefileError, BuildError, BuildOrchestrator, ConfigError, DeployError,
    DeployOrchestrator, DeployOutcome, GitHubFetcher, HostBackend, HostConfig, HostError,
    Hypervisor, ImageResolver, ImageStore, JanitorError, LxdError, LxdHypervisor, MultipassHost,
    NativeHost, ProcessCommandRunner, ResolveError, SubcommandStreamingRunner, UnitDescription,
    logging, prune_images,
};

mod cli;
#[cfg(test)]
mod main_tests;

use cli::{BuildCommand, Cli, DeployCommand, RemoveCommand};

/// Exit status for command-line usage errors.
const USAGE_EXIT_CODE: i32 = 2;

type Lxd = LxdHypervisor<SubcommandStreamingRunner>;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid Bravefile: {0}")]
    Bravefile(#[from] BravefileError),
    #[error("host error: {0}")]
    Host(#[from] HostError),
    #[error("hypervisor error: {0}")]
    Hypervisor(#[from] LxdError),
    #[error("image store error: {0}")]
    Store(#[from] ResolveError),
    #[error("image prune failed: {0}")]
    Prune(Box<JanitorError<LxdError>>),
    #[error("deployment failed: {0}")]
    Deploy(Box<DeployError<LxdError>>),
    #[error("build failed: {0}")]
    Build(Box<BuildError<LxdError>>),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("cannot use working directory: {0}")]
    WorkingDir(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => USAGE_EXIT_CODE,
            Self::Deploy(err) if err.is_interrupted() => i32::from(INTERRUPTED_EXIT_CODE),
            Self::Build(err) if err.is_interrupted() => i32::from(INTERRUPTED_EXIT_CODE),
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();

    let cancel = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone());
    let exit_code = match dispatch(cli, &cancel).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };
    listener.abort();

    process::exit(exit_code);
}

async fn dispatch(cli: Cli, cancel: &CancellationToken) -> Result<i32, CliError> {
    match cli {
        Cli::Deploy(args) => exec_deploy(&args, cancel).await,
        Cli::Build(args) => exec_build(&args, cancel).await,
        Cli::Units => exec_units().await,
        Cli::Remove(args) => exec_remove(&args).await,
        Cli::Images => exec_images(),
        Cli::Info => exec_info().await,
    }
}

/// Host, hypervisor and configuration shared by the backend commands.
struct Services {
    config: HostConfig,
    host: Box<dyn HostBackend>,
    hypervisor: Lxd,
}

impl Services {
    fn load() -> Result<Self, CliError> {
        let config = HostConfig::load_without_cli_args()?;
        let remote = config.remote()?;
        let host: Box<dyn HostBackend> = match config.backend_kind()? {
            BackendKind::Multipass => Box::new(
                MultipassHost::new(config.vm_name.trim(), remote.clone(), ProcessCommandRunner)
                    .with_binaries(config.multipass_bin.trim(), config.lxc_bin.trim())
                    .with_storage_pool(config.storage_pool.trim()),
            ),
            BackendKind::Lxd => Box::new(
                NativeHost::new(ProcessCommandRunner)
                    .with_lxc_bin(config.lxc_bin.trim())
                    .with_storage_pool(config.storage_pool.trim()),
            ),
        };
        let hypervisor = LxdHypervisor::new(
            remote,
            config.lxc_bin.trim(),
            SubcommandStreamingRunner::new("exec"),
        );
        Ok(Self {
            config,
            host,
            hypervisor,
        })
    }

    async fn ready(&self) -> Result<(), CliError> {
        self.host.ensure_running().await?;
        info!(backend = %self.config.backend, "host ready");
        Ok(())
    }

    fn resolver(&self) -> ImageResolver<GitHubFetcher> {
        ImageResolver::new(
            ImageStore::new(self.config.image_store_dir()),
            GitHubFetcher::new(
                self.config.github_raw_base.trim(),
                self.config.github_branch.trim(),
            ),
        )
    }

    fn builder(
        &self,
        working_dir: &Utf8Path,
        cancel: &CancellationToken,
    ) -> BuildOrchestrator<Lxd, GitHubFetcher> {
        BuildOrchestrator::new(self.hypervisor.clone(), self.resolver(), working_dir)
            .with_profile(self.config.profile.trim())
            .with_cancellation(cancel.clone())
    }

    async fn prune(&self) -> Result<(), CliError> {
        if !self.config.prune_images {
            return Ok(());
        }
        let summary = prune_images(&self.hypervisor)
            .await
            .map_err(|err| CliError::Prune(Box::new(err)))?;
        info!(deleted = summary.deleted.len(), "pruned host images");
        Ok(())
    }
}

async fn exec_deploy(args: &DeployCommand, cancel: &CancellationToken) -> Result<i32, CliError> {
    let working_dir = working_dir()?;
    let description = deploy_description(args, &working_dir)?;

    let services = Services::load()?;
    services.ready().await?;
    services.prune().await?;

    let orchestrator = DeployOrchestrator::new(
        services.hypervisor.clone(),
        services.resolver(),
        services.builder(&working_dir, cancel),
        working_dir.clone(),
    )
    .with_profile(services.config.profile.trim())
    .with_cancellation(cancel.clone());
    let outcome = orchestrator
        .deploy(&description)
        .await
        .map_err(|err| CliError::Deploy(Box::new(err)))?;

    services.prune().await?;
    write_deploy_summary(io::stdout().lock(), &outcome)?;
    Ok(outcome.run_status)
}

async fn exec_build(args: &BuildCommand, cancel: &CancellationToken) -> Result<i32, CliError> {
    let working_dir = working_dir()?;
    let path = bravefile_path(args.config.as_deref(), &working_dir).ok_or_else(|| {
        CliError::Usage(format!(
            "no {BRAVEFILE_NAME} found in {working_dir}: pass --config PATH"
        ))
    })?;
    let description = UnitDescription::load(&path)?;
    description.validate_for_build()?;

    let services = Services::load()?;
    services.ready().await?;
    let outcome = services
        .builder(&working_dir, cancel)
        .execute(&description)
        .await
        .map_err(|err| CliError::Build(Box::new(err)))?;

    writeln!(io::stdout().lock(), "built {} at {}", outcome.image, outcome.tarball)?;
    Ok(0)
}

async fn exec_units() -> Result<i32, CliError> {
    let services = Services::load()?;
    services.ready().await?;
    let units = services.hypervisor.list_instances().await?;

    let mut out = io::stdout().lock();
    writeln!(out, "{:<24}{:<12}IPV4", "NAME", "STATUS")?;
    for unit in units {
        writeln!(
            out,
            "{:<24}{:<12}{}",
            unit.name,
            unit.status,
            unit.ipv4.join(", ")
        )?;
    }
    Ok(0)
}

async fn exec_remove(args: &RemoveCommand) -> Result<i32, CliError> {
    let name = args.name.trim();
    if name.is_empty() {
        return Err(CliError::Usage(String::from("unit name must not be empty")));
    }
    let services = Services::load()?;
    services.ready().await?;
    services.hypervisor.delete_instance(name).await?;
    writeln!(io::stdout().lock(), "removed {name}")?;
    Ok(0)
}

fn exec_images() -> Result<i32, CliError> {
    let config = HostConfig::load_without_cli_args()?;
    let images = ImageStore::new(config.image_store_dir()).list()?;

    let mut out = io::stdout().lock();
    writeln!(out, "{:<40}SIZE", "IMAGE")?;
    for image in images {
        writeln!(out, "{:<40}{}", image.name, format_bytes_si(image.size))?;
    }
    Ok(0)
}

async fn exec_info() -> Result<i32, CliError> {
    let services = Services::load()?;
    let info = services.host.info().await?;
    write!(io::stdout().lock(), "{info}")?;
    Ok(0)
}

/// Builds the unit description for `brave deploy`.
///
/// A Bravefile wins over the positional image and the unit flags.
fn deploy_description(
    args: &DeployCommand,
    working_dir: &Utf8Path,
) -> Result<UnitDescription, CliError> {
    if let Some(path) = bravefile_path(args.config.as_deref(), working_dir) {
        if has_unit_flags(args) {
            warn!(bravefile = %path, "using Bravefile; image, --ip, --port and --name are ignored");
        }
        return Ok(UnitDescription::load(&path)?);
    }

    let image = non_empty(args.image.as_deref()).ok_or_else(|| {
        CliError::Usage(format!(
            "missing image: pass IMAGE or provide a {BRAVEFILE_NAME}"
        ))
    })?;
    let name = non_empty(args.name.as_deref())
        .ok_or_else(|| CliError::Usage(String::from("missing unit name: pass --name NAME")))?;

    let mut description = UnitDescription::for_image(image, name);
    description.service.ip = args.ip;
    description.service.ports = args
        .ports
        .iter()
        .map(|port| port.parse::<PortMapping>())
        .collect::<Result<_, _>>()?;
    description.validate()?;
    Ok(description)
}

/// Bravefile named by `--config`, else `./Bravefile` when present.
fn bravefile_path(config: Option<&str>, working_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    if let Some(path) = non_empty(config) {
        return Some(working_dir.join(expand_tilde(path)));
    }
    let default = working_dir.join(BRAVEFILE_NAME);
    default.is_file().then_some(default)
}

const fn has_unit_flags(args: &DeployCommand) -> bool {
    args.image.is_some() || args.ip.is_some() || !args.ports.is_empty() || args.name.is_some()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

fn working_dir() -> Result<Utf8PathBuf, CliError> {
    let cwd = std::env::current_dir().map_err(|err| CliError::WorkingDir(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| CliError::WorkingDir(format!("{} is not valid UTF-8", path.display())))
}

fn write_deploy_summary(mut target: impl Write, outcome: &DeployOutcome) -> io::Result<()> {
    writeln!(target, "deployed {}", outcome.unit)?;
    for proxy in &outcome.proxies {
        writeln!(target, "  {} -> {}", proxy.listen, proxy.connect)?;
    }
    if outcome.run_status != 0 {
        writeln!(
            target,
            "last run command exited with status {}",
            outcome.run_status
        )?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "brave: {err}").ok();
}
