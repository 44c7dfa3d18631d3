//! [`Hypervisor`] implementation that drives the `lxc` client.

use std::ffi::OsString;

use camino::Utf8Path;
use tracing::debug;

use super::types::{LxcImage, LxcInstance};
use super::{
    ExecOutput, Fingerprint, Hypervisor, HypervisorFuture, ImageInfo, InstanceInfo, LaunchImage,
    LaunchRequest, LxdError, ProxyDevice,
};
use crate::exec::{CommandOutput, CommandRunner, ProcessCommandRunner, render_command};
use crate::remote::Remote;

/// Default `lxc` client binary name.
pub const DEFAULT_LXC_BIN: &str = "lxc";

/// Hypervisor backed by the `lxc` command line client.
#[derive(Clone, Debug)]
pub struct LxdHypervisor<R: CommandRunner> {
    remote: Remote,
    lxc_bin: String,
    runner: R,
}

impl LxdHypervisor<ProcessCommandRunner> {
    /// Creates a hypervisor wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(remote: Remote, lxc_bin: impl Into<String>) -> Self {
        Self::new(remote, lxc_bin, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> LxdHypervisor<R> {
    /// Creates a hypervisor that targets `remote` through `runner`.
    #[must_use]
    pub fn new(remote: Remote, lxc_bin: impl Into<String>, runner: R) -> Self {
        Self {
            remote,
            lxc_bin: lxc_bin.into(),
            runner,
        }
    }

    /// Remote every operation targets.
    #[must_use]
    pub const fn remote(&self) -> &Remote {
        &self.remote
    }

    fn run_raw(&self, args: &[OsString]) -> Result<CommandOutput, LxdError> {
        Ok(self.runner.run(&self.lxc_bin, args)?)
    }

    fn run_checked(&self, args: &[OsString]) -> Result<CommandOutput, LxdError> {
        let output = self.run_raw(args)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(LxdError::CommandFailure {
            command: render_command(&self.lxc_bin, args),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn import_image_sync(&self, tarball: &Utf8Path, alias: &str) -> Result<Fingerprint, LxdError> {
        let args = os_args([
            "image",
            "import",
            tarball.as_str(),
            &self.remote.root(),
            "--alias",
            alias,
        ]);
        let output = self.run_checked(&args)?;
        parse_fingerprint(&output.stdout, "image import")
    }

    fn launch_sync(&self, request: &LaunchRequest) -> Result<(), LxdError> {
        let image = match &request.image {
            LaunchImage::Fingerprint(fingerprint) => self.remote.target(fingerprint.as_str()),
            LaunchImage::Remote(alias) => alias.clone(),
        };
        let mut args = os_args([
            "init",
            &image,
            &self.remote.target(&request.name),
            "--profile",
            &request.profile,
        ]);
        if let Some(cpu) = &request.cpu {
            args.extend(os_args(["-c", &format!("limits.cpu={cpu}")]));
        }
        if let Some(ram) = &request.ram {
            args.extend(os_args(["-c", &format!("limits.memory={ram}")]));
        }
        if let Some(disk) = &request.disk {
            args.extend(os_args(["-d", &format!("root,size={disk}")]));
        }
        if let Some(ip) = request.ip {
            args.extend(os_args(["-d", &format!("eth0,ipv4.address={ip}")]));
        }
        self.run_checked(&args).map(drop)
    }

    fn exec_sync(&self, name: &str, argv: &[String]) -> Result<ExecOutput, LxdError> {
        let mut args = os_args(["exec", &self.remote.target(name), "--"]);
        args.extend(argv.iter().map(OsString::from));
        let output = self.run_raw(&args)?;
        let status = output.code.ok_or_else(|| LxdError::CommandFailure {
            command: render_command(&self.lxc_bin, &args),
            status: None,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })?;
        Ok(ExecOutput {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn push_sync(
        &self,
        name: &str,
        source: &Utf8Path,
        target: &str,
        recursive: bool,
    ) -> Result<(), LxdError> {
        let destination = self.remote.instance_path(name, target);
        let mut args = os_args(["file", "push"]);
        if recursive {
            args.push(OsString::from("-r"));
        }
        args.extend(os_args(["-p", source.as_str(), &destination]));
        self.run_checked(&args).map(drop)
    }

    fn push_symlink_sync(
        &self,
        name: &str,
        source: &Utf8Path,
        target: &str,
    ) -> Result<(), LxdError> {
        let link_target = std::fs::read_link(source).map_err(|err| LxdError::Source {
            path: source.to_string(),
            message: err.to_string(),
        })?;
        let file_name = source.file_name().ok_or_else(|| LxdError::Source {
            path: source.to_string(),
            message: String::from("symbolic link has no file name"),
        })?;
        let directory = format!("/{}", target.trim_matches('/'));
        let link_path = format!("{}/{file_name}", directory.trim_end_matches('/'));
        debug!(link = %link_path, target = %link_target.display(), "recreating symbolic link");

        for argv in [
            vec![String::from("mkdir"), String::from("-p"), directory],
            vec![
                String::from("ln"),
                String::from("-sfn"),
                link_target.to_string_lossy().into_owned(),
                link_path,
            ],
        ] {
            let output = self.exec_sync(name, &argv)?;
            if output.status != 0 {
                return Err(LxdError::CommandFailure {
                    command: argv.join(" "),
                    status: Some(output.status),
                    status_text: output.status.to_string(),
                    stderr: output.stderr.trim().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn add_proxy_device_sync(&self, name: &str, device: &ProxyDevice) -> Result<(), LxdError> {
        let args = os_args([
            "config",
            "device",
            "add",
            &self.remote.target(name),
            &device.name,
            &device.kind.to_string(),
            &format!("listen={}", device.listen),
            &format!("connect={}", device.connect),
        ]);
        self.run_checked(&args).map(drop)
    }

    fn list_images_sync(&self) -> Result<Vec<ImageInfo>, LxdError> {
        let args = os_args(["image", "list", &self.remote.root(), "--format", "json"]);
        let output = self.run_checked(&args)?;
        let images: Vec<LxcImage> =
            serde_json::from_str(&output.stdout).map_err(|err| LxdError::Parse {
                resource: String::from("image list"),
                message: err.to_string(),
            })?;
        Ok(images.into_iter().map(ImageInfo::from).collect())
    }

    fn list_instances_sync(&self) -> Result<Vec<InstanceInfo>, LxdError> {
        let args = os_args(["list", &self.remote.root(), "--format", "json"]);
        let output = self.run_checked(&args)?;
        let instances: Vec<LxcInstance> =
            serde_json::from_str(&output.stdout).map_err(|err| LxdError::Parse {
                resource: String::from("list"),
                message: err.to_string(),
            })?;
        Ok(instances.into_iter().map(InstanceInfo::from).collect())
    }

    fn publish_sync(&self, name: &str, alias: &str) -> Result<Fingerprint, LxdError> {
        let args = os_args([
            "publish",
            &self.remote.target(name),
            &self.remote.root(),
            "--alias",
            alias,
        ]);
        let output = self.run_checked(&args)?;
        parse_fingerprint(&output.stdout, "publish")
    }
}

impl<R> LxdHypervisor<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Runs `call` on the blocking pool so the returned future yields while
    /// `lxc` is running and can lose a race against cancellation.
    fn blocking<'a, T, F>(&self, call: F) -> HypervisorFuture<'a, T, LxdError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, LxdError> + Send + 'static,
    {
        let lxd = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || call(&lxd))
                .await
                .map_err(|err| LxdError::Task(err.to_string()))?
        })
    }

    fn checked<'a>(&self, args: Vec<OsString>) -> HypervisorFuture<'a, (), LxdError> {
        self.blocking(move |lxd| lxd.run_checked(&args).map(drop))
    }
}

impl<R> Hypervisor for LxdHypervisor<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    type Error = LxdError;

    fn import_image<'a>(
        &'a self,
        tarball: &'a Utf8Path,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error> {
        let tarball = tarball.to_owned();
        let alias = alias.to_owned();
        self.blocking(move |lxd| lxd.import_image_sync(&tarball, &alias))
    }

    fn delete_image<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args([
            "image",
            "delete",
            &self.remote.target(fingerprint.as_str()),
        ]))
    }

    fn list_images(&self) -> HypervisorFuture<'_, Vec<ImageInfo>, Self::Error> {
        self.blocking(Self::list_images_sync)
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> HypervisorFuture<'a, (), Self::Error> {
        let request = request.clone();
        self.blocking(move |lxd| lxd.launch_sync(&request))
    }

    fn start<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args(["start", &self.remote.target(name)]))
    }

    fn stop<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args(["stop", &self.remote.target(name)]))
    }

    fn delete_instance<'a>(&'a self, name: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args(["delete", &self.remote.target(name), "--force"]))
    }

    fn list_instances(&self) -> HypervisorFuture<'_, Vec<InstanceInfo>, Self::Error> {
        self.blocking(Self::list_instances_sync)
    }

    fn exec<'a>(
        &'a self,
        name: &'a str,
        argv: &'a [String],
    ) -> HypervisorFuture<'a, ExecOutput, Self::Error> {
        let name = name.to_owned();
        let argv = argv.to_vec();
        self.blocking(move |lxd| lxd.exec_sync(&name, &argv))
    }

    fn push_directory<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        let (name, source, target) = (name.to_owned(), source.to_owned(), target.to_owned());
        self.blocking(move |lxd| lxd.push_sync(&name, &source, &target, true))
    }

    fn push_symlink<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        let (name, source, target) = (name.to_owned(), source.to_owned(), target.to_owned());
        self.blocking(move |lxd| lxd.push_symlink_sync(&name, &source, &target))
    }

    fn push_file<'a>(
        &'a self,
        name: &'a str,
        source: &'a Utf8Path,
        target: &'a str,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        let (name, source, target) = (name.to_owned(), source.to_owned(), target.to_owned());
        self.blocking(move |lxd| lxd.push_sync(&name, &source, &target, false))
    }

    fn add_proxy_device<'a>(
        &'a self,
        name: &'a str,
        device: &'a ProxyDevice,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        let name = name.to_owned();
        let device = device.clone();
        self.blocking(move |lxd| lxd.add_proxy_device_sync(&name, &device))
    }

    fn delete_storage_pool<'a>(&'a self, pool: &'a str) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args(["storage", "delete", &self.remote.target(pool)]))
    }

    fn publish<'a>(
        &'a self,
        name: &'a str,
        alias: &'a str,
    ) -> HypervisorFuture<'a, Fingerprint, Self::Error> {
        let name = name.to_owned();
        let alias = alias.to_owned();
        self.blocking(move |lxd| lxd.publish_sync(&name, &alias))
    }

    fn export_image<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        destination: &'a Utf8Path,
    ) -> HypervisorFuture<'a, (), Self::Error> {
        self.checked(os_args([
            "image",
            "export",
            &self.remote.target(fingerprint.as_str()),
            destination.as_str(),
        ]))
    }
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

/// Extracts the fingerprint from `lxc image import` or `lxc publish` output,
/// which ends with `... fingerprint: <hex>`.
fn parse_fingerprint(stdout: &str, resource: &str) -> Result<Fingerprint, LxdError> {
    stdout
        .lines()
        .rev()
        .find_map(|line| {
            line.split_once("fingerprint:")
                .map(|(_, value)| value.trim())
                .filter(|value| !value.is_empty())
        })
        .map(Fingerprint::new)
        .ok_or_else(|| LxdError::Parse {
            resource: resource.to_owned(),
            message: format!("no fingerprint in output: {}", stdout.trim()),
        })
}
