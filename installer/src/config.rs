//! Resolved installer configuration.
//!
//! [`InstallerConfig`] is built once per run from the command line and the
//! platform directories, then passed read-only to every pipeline step.

use crate::cli::{InstallArgs, ProgressFormat};
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::install::{DEFAULT_INSTALL_DIR, ElevationPolicy};
use crate::monitor::MonitorSettings;
use crate::source::{OMNI_PACKAGE_NAME, OMNI_REPO_URL, is_source_checkout};
use camino::{Utf8Path, Utf8PathBuf};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// Where the source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A checkout managed by the installer: cloned or refreshed as needed.
    Managed(Utf8PathBuf),
    /// The checkout the installer was started from, used as-is.
    InTree(Utf8PathBuf),
}

impl SourceLocation {
    /// Root of the source tree.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Managed(path) | Self::InTree(path) => path,
        }
    }
}

/// Everything a run needs to know, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    /// Git URL of the source repository.
    pub repo_url: String,
    /// Location of the source tree.
    pub source: SourceLocation,
    /// Directory the binary is installed into.
    pub install_dir: Utf8PathBuf,
    /// Directory rustup installs cargo into.
    pub cargo_bin_dir: Utf8PathBuf,
    /// Name of the binary to build and install.
    pub binary_name: String,
    /// Parallel build jobs.
    pub jobs: Option<NonZeroUsize>,
    /// Summary interval and diagnostic tail size.
    pub monitor: MonitorSettings,
    /// Optional build time limit.
    pub build_timeout: Option<Duration>,
    /// Progress rendering.
    pub progress_format: ProgressFormat,
    /// Whether existing checkouts are refreshed.
    pub update: bool,
    /// Whether the toolchain probe is skipped.
    pub skip_toolchain: bool,
    /// Which elevation mechanisms the installer may use.
    pub elevation: ElevationPolicy,
    /// Print the plan and exit.
    pub dry_run: bool,
    /// Suppress per-unit progress.
    pub quiet: bool,
}

impl InstallerConfig {
    /// Resolve configuration from arguments and the environment.
    ///
    /// When no `--source-dir` is given and `cwd` is itself an omni checkout,
    /// that checkout is built in place.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::DirectoryUnavailable`] when a default
    /// directory cannot be determined, or [`InstallerError::NonUtf8Path`] when
    /// it is not valid UTF-8.
    pub fn resolve(
        args: &InstallArgs,
        dirs: &dyn BaseDirs,
        cwd: Option<&Utf8Path>,
        stdin_is_terminal: bool,
    ) -> Result<Self> {
        let source = resolve_source(args, dirs, cwd)?;
        let cargo_bin_dir = dirs
            .cargo_home()
            .ok_or(InstallerError::DirectoryUnavailable {
                what: "the cargo home directory",
            })
            .and_then(utf8)?
            .join("bin");

        Ok(Self {
            repo_url: args
                .repo_url
                .clone()
                .unwrap_or_else(|| OMNI_REPO_URL.to_owned()),
            source,
            install_dir: args
                .install_dir
                .clone()
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_INSTALL_DIR)),
            cargo_bin_dir,
            binary_name: args.binary_name.clone(),
            jobs: args.jobs,
            monitor: MonitorSettings {
                summary_every: args.summary_every,
                tail_lines: args.tail_lines,
            },
            build_timeout: args.build_timeout.map(Duration::from_secs),
            progress_format: args.progress_format,
            update: !args.no_update,
            skip_toolchain: args.skip_toolchain,
            elevation: ElevationPolicy {
                allow_sudo: !args.no_sudo,
                interactive: stdin_is_terminal,
            },
            dry_run: args.dry_run,
            quiet: args.quiet,
        })
    }
}

fn resolve_source(
    args: &InstallArgs,
    dirs: &dyn BaseDirs,
    cwd: Option<&Utf8Path>,
) -> Result<SourceLocation> {
    if let Some(dir) = &args.source_dir {
        return Ok(SourceLocation::Managed(dir.clone()));
    }
    if let Some(cwd) = cwd.filter(|dir| is_source_checkout(dir)) {
        log::debug!("running inside an omni checkout at {cwd}");
        return Ok(SourceLocation::InTree(cwd.to_owned()));
    }

    let data_dir = dirs
        .data_dir()
        .ok_or(InstallerError::DirectoryUnavailable {
            what: "the user data directory",
        })
        .and_then(utf8)?;
    Ok(SourceLocation::Managed(data_dir.join(OMNI_PACKAGE_NAME)))
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::try_from(path).map_err(|e| InstallerError::NonUtf8Path {
        path: e.into_path_buf().display().to_string(),
    })
}
