//! Copy and run directives applied inside a unit.
//!
//! Shared by the deploy and build pipelines. Directives are applied strictly
//! in declared order and the first failure aborts the remainder; nothing is
//! retried or compensated here.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{info, warn};

use crate::bravefile::{CopyDirective, RunDirective};
use crate::hypervisor::Hypervisor;

/// How a host copy source is transferred.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    /// Pushed recursively.
    Directory,
    /// Recreated as a link with the same target.
    Symlink,
    /// Pushed as a single file.
    File,
}

/// How run directive exit statuses are treated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunPolicy {
    /// Keep going and report the last directive's status.
    ReportLast,
    /// Fail on the first non-zero status.
    HaltOnFailure,
}

/// Errors raised while applying directives.
#[derive(Debug, Error)]
pub enum ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a host copy source cannot be inspected.
    #[error("copy directive {index} ({path}): cannot inspect source: {message}")]
    Source {
        /// Zero-based directive index.
        index: usize,
        /// Resolved host path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the hypervisor fails during a copy directive.
    #[error("copy directive {index} ({path}) failed: {cause}")]
    Copy {
        /// Zero-based directive index.
        index: usize,
        /// Source as written in the Bravefile.
        path: String,
        /// Hypervisor error.
        #[source]
        cause: E,
    },
    /// Raised when the hypervisor fails during a run directive.
    #[error("run directive {index} ({command}) failed: {cause}")]
    Run {
        /// Zero-based directive index.
        index: usize,
        /// Program that was executed.
        command: String,
        /// Hypervisor error.
        #[source]
        cause: E,
    },
    /// Raised when a command inside the unit exits non-zero and the stage
    /// cannot continue.
    #[error("{stage} directive {index}: `{command}` exited with status {status}")]
    Status {
        /// `copy` or `run`.
        stage: &'static str,
        /// Zero-based directive index.
        index: usize,
        /// Rendered command.
        command: String,
        /// Exit status.
        status: i32,
    },
}

/// Classifies a host path without following a trailing symbolic link.
///
/// # Errors
///
/// Returns the I/O error message when the path cannot be inspected.
pub fn classify_source(path: &Utf8Path) -> Result<SourceKind, String> {
    let (dir_path, entry) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_str().is_empty() => (parent, name),
        (_, Some(name)) => (Utf8Path::new("."), name),
        _ => return Ok(SourceKind::Directory),
    };
    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    let metadata = dir.symlink_metadata(entry).map_err(|err| err.to_string())?;
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        Ok(SourceKind::Symlink)
    } else if file_type.is_dir() {
        Ok(SourceKind::Directory)
    } else {
        Ok(SourceKind::File)
    }
}

/// Applies copy directives to `unit`, resolving sources against
/// `working_dir`.
///
/// Each directive creates its target directory, pushes the source according
/// to its [`SourceKind`], then runs the optional action with `bash -c`. A
/// non-zero action status is logged and does not abort the stage.
///
/// # Errors
///
/// Returns [`ProvisionError`] naming the failing directive.
pub async fn apply_copy_directives<H>(
    hypervisor: &H,
    unit: &str,
    directives: &[CopyDirective],
    working_dir: &Utf8Path,
) -> Result<(), ProvisionError<H::Error>>
where
    H: Hypervisor + ?Sized,
{
    for (index, directive) in directives.iter().enumerate() {
        let copy_error = |cause: H::Error| ProvisionError::Copy {
            index,
            path: directive.source.clone(),
            cause,
        };

        let mkdir = vec![
            String::from("mkdir"),
            String::from("-p"),
            directive.target.clone(),
        ];
        let output = hypervisor.exec(unit, &mkdir).await.map_err(copy_error)?;
        if output.status != 0 {
            return Err(ProvisionError::Status {
                stage: "copy",
                index,
                command: mkdir.join(" "),
                status: output.status,
            });
        }

        let source = working_dir.join(directive.source.trim_end_matches('/'));
        let kind = classify_source(&source).map_err(|message| ProvisionError::Source {
            index,
            path: source.clone(),
            message,
        })?;
        info!(unit, source = %source, target = %directive.target, ?kind, "copying");
        let push = match kind {
            SourceKind::Directory => hypervisor.push_directory(unit, &source, &directive.target),
            SourceKind::Symlink => hypervisor.push_symlink(unit, &source, &directive.target),
            SourceKind::File => hypervisor.push_file(unit, &source, &directive.target),
        };
        push.await.map_err(copy_error)?;

        if let Some(action) = directive.action.as_deref().filter(|text| !text.trim().is_empty()) {
            let argv = vec![String::from("bash"), String::from("-c"), action.to_owned()];
            let result = hypervisor.exec(unit, &argv).await.map_err(copy_error)?;
            if result.status != 0 {
                warn!(unit, index, action, status = result.status, "copy action failed");
            }
        }
    }
    Ok(())
}

/// Applies run directives to `unit` and returns the last exit status, or 0
/// when there are no directives.
///
/// # Errors
///
/// Returns [`ProvisionError::Run`] on transport failures and, under
/// [`RunPolicy::HaltOnFailure`], [`ProvisionError::Status`] for the first
/// non-zero status.
pub async fn apply_run_directives<H>(
    hypervisor: &H,
    unit: &str,
    directives: &[RunDirective],
    policy: RunPolicy,
) -> Result<i32, ProvisionError<H::Error>>
where
    H: Hypervisor + ?Sized,
{
    let mut status = 0;
    for (index, directive) in directives.iter().enumerate() {
        let argv = directive.argv();
        info!(unit, index, command = %directive.command, "running");
        let output = hypervisor
            .exec(unit, &argv)
            .await
            .map_err(|cause| ProvisionError::Run {
                index,
                command: directive.command.clone(),
                cause,
            })?;
        status = output.status;
        if status != 0 {
            if policy == RunPolicy::HaltOnFailure {
                return Err(ProvisionError::Status {
                    stage: "run",
                    index,
                    command: argv.join(" "),
                    status,
                });
            }
            warn!(unit, index, status, "run directive exited non-zero");
        }
    }
    Ok(status)
}
