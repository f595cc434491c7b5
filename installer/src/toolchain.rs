//! Toolchain detection and installation.
//!
//! [`PrerequisiteChecker`] makes sure `cargo` and `rustc` are usable before a
//! build starts. The toolchain is re-probed on every run; nothing is cached
//! between invocations. When cargo is missing the official rustup installer is
//! run non-interactively and the search path is rebuilt so the new binaries
//! resolve within the same process.
//!
//! [`PinnedToolchain`] handles the second half: once the source tree is
//! available, a `rust-toolchain.toml` pin is honoured via rustup.

use crate::deps::{CommandExecutor, command_succeeds, first_stdout_line, stderr_message};
use crate::error::{InstallerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsString;

/// Shell pipeline used to run rustup-init without prompts.
pub const RUSTUP_INIT_SCRIPT: &str = concat!(
    "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs",
    " | sh -s -- -y --profile minimal"
);

/// Presence and version of the Rust toolchain, probed for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainInfo {
    cargo: String,
    cargo_version: String,
    rustc_version: Option<String>,
    installed_now: bool,
    linker_available: bool,
    search_path: Option<OsString>,
}

impl ToolchainInfo {
    /// Returns the cargo program to invoke (a bare name or an absolute path).
    #[must_use]
    pub fn cargo(&self) -> &str {
        &self.cargo
    }

    /// Returns the first line of `cargo --version`.
    #[must_use]
    pub fn cargo_version(&self) -> &str {
        &self.cargo_version
    }

    /// Returns the first line of `rustc --version`, when it could be read.
    #[must_use]
    pub fn rustc_version(&self) -> Option<&str> {
        self.rustc_version.as_deref()
    }

    /// Returns true if the toolchain was installed during this run.
    #[must_use]
    pub fn installed_now(&self) -> bool {
        self.installed_now
    }

    /// Returns true if a C linker (`cc`) was found.
    #[must_use]
    pub fn linker_available(&self) -> bool {
        self.linker_available
    }

    /// Returns the re-sourced `PATH` that later commands must use.
    #[must_use]
    pub fn search_path(&self) -> Option<&OsString> {
        self.search_path.as_ref()
    }

    /// Describes a toolchain that was not probed (`--skip-toolchain`).
    #[must_use]
    pub fn assumed(search_path: Option<OsString>) -> Self {
        Self {
            cargo: "cargo".to_owned(),
            cargo_version: "unknown (probe skipped)".to_owned(),
            rustc_version: None,
            installed_now: false,
            linker_available: true,
            search_path,
        }
    }
}

/// Verifies, and installs when missing, the toolchain needed for the build.
pub struct PrerequisiteChecker<'a> {
    executor: &'a dyn CommandExecutor,
    cargo_bin_dir: Utf8PathBuf,
    installer_output_on_stderr: bool,
}

impl<'a> PrerequisiteChecker<'a> {
    /// Create a checker that installs into `cargo_bin_dir` when needed.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, cargo_bin_dir: Utf8PathBuf) -> Self {
        Self {
            executor,
            cargo_bin_dir,
            installer_output_on_stderr: false,
        }
    }

    /// Send the rustup installer's stdout to stderr, keeping stdout free for
    /// machine-readable progress.
    #[must_use]
    pub fn with_installer_output_on_stderr(mut self, enabled: bool) -> Self {
        self.installer_output_on_stderr = enabled;
        self
    }

    /// Ensure a working toolchain is present.
    ///
    /// Probe order: `cargo` on the current `PATH`, then `cargo` inside the
    /// cargo bin directory (installed but the shell was never reloaded), and
    /// only then the rustup installer.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ToolchainInstallFailed`] if the installer
    /// fails, or [`InstallerError::ToolchainNotVisible`] if cargo still cannot
    /// be found afterwards. Neither is retried.
    pub fn ensure_toolchain(&self) -> Result<ToolchainInfo> {
        if let Some(version) = self.probe_version("cargo") {
            log::debug!("cargo found on PATH: {version}");
            return Ok(self.describe("cargo".to_owned(), version, false, None));
        }

        let cargo_path = self.cargo_bin_dir.join(cargo_executable());
        if let Some(version) = self.probe_version(cargo_path.as_str()) {
            log::debug!("cargo found at {cargo_path} but not on PATH: {version}");
            let search_path = self.resourced_path()?;
            return Ok(self.describe(cargo_path.into_string(), version, false, Some(search_path)));
        }

        log::info!("cargo not found, running rustup installer");
        self.run_installer()?;

        let Some(version) = self.probe_version(cargo_path.as_str()) else {
            return Err(InstallerError::ToolchainNotVisible {
                cargo_bin_dir: self.cargo_bin_dir.clone(),
            });
        };
        let search_path = self.resourced_path()?;
        Ok(self.describe(cargo_path.into_string(), version, true, Some(search_path)))
    }

    fn describe(
        &self,
        cargo: String,
        cargo_version: String,
        installed_now: bool,
        search_path: Option<OsString>,
    ) -> ToolchainInfo {
        let rustc = if cargo == "cargo" {
            "rustc".to_owned()
        } else {
            self.cargo_bin_dir.join(rustc_executable()).into_string()
        };
        let rustc_version = self.probe_version(&rustc);
        let linker_available = command_succeeds(self.executor, "cc", &["--version"]);
        if !linker_available {
            log::warn!("no C linker (cc) found; the build may fail to link");
        }

        ToolchainInfo {
            cargo,
            cargo_version,
            rustc_version,
            installed_now,
            linker_available,
            search_path: search_path.or_else(|| self.executor.search_path()),
        }
    }

    fn probe_version(&self, program: &str) -> Option<String> {
        self.executor
            .run(program, &["--version"])
            .ok()
            .filter(|output| output.status.success())
            .map(|output| first_stdout_line(&output))
    }

    fn run_installer(&self) -> Result<()> {
        let script = if self.installer_output_on_stderr {
            format!("({RUSTUP_INIT_SCRIPT}) 1>&2")
        } else {
            RUSTUP_INIT_SCRIPT.to_owned()
        };
        let status = self
            .executor
            .run_interactive("sh", &["-c", &script])
            .map_err(|e| InstallerError::ToolchainInstallFailed {
                message: e.to_string(),
            })?;

        if status.success() {
            return Ok(());
        }

        Err(InstallerError::ToolchainInstallFailed {
            message: format!("rustup installer exited with {status}"),
        })
    }

    /// Prepend the cargo bin directory to the executor's search path.
    fn resourced_path(&self) -> Result<OsString> {
        let existing = self.executor.search_path().unwrap_or_default();
        prepend_to_path(self.cargo_bin_dir.as_std_path(), &existing)
    }
}

/// Prepend `dir` to a `PATH`-style value, dropping any later duplicate.
///
/// # Errors
///
/// Returns [`InstallerError::ToolchainDetection`] if the directory contains
/// the platform path separator.
pub fn prepend_to_path(dir: &std::path::Path, existing: &OsString) -> Result<OsString> {
    let rest = std::env::split_paths(existing).filter(|entry| entry != dir);
    std::env::join_paths(std::iter::once(dir.to_path_buf()).chain(rest)).map_err(|e| {
        InstallerError::ToolchainDetection {
            reason: format!("cannot add {} to PATH: {e}", dir.display()),
        }
    })
}

const fn cargo_executable() -> &'static str {
    if cfg!(windows) { "cargo.exe" } else { "cargo" }
}

const fn rustc_executable() -> &'static str {
    if cfg!(windows) { "rustc.exe" } else { "rustc" }
}

/// Outcome of honouring a `rust-toolchain.toml` pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    /// The pinned channel was already installed.
    AlreadyInstalled,
    /// The pinned channel was installed during this run.
    Installed,
    /// rustup is not available, so cargo's default toolchain will be used.
    RustupUnavailable,
}

/// A toolchain channel pinned by the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedToolchain {
    channel: String,
    components: Vec<String>,
}

impl PinnedToolchain {
    /// Read the pin from `<source_root>/rust-toolchain.toml`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn detect(source_root: &Utf8Path) -> Result<Option<Self>> {
        let toolchain_path = source_root.join("rust-toolchain.toml");
        if !toolchain_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&toolchain_path)?;
        parse_toolchain_config(&contents).map(Some)
    }

    /// Return the pinned channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Install the pinned channel and components via rustup when missing.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PinnedToolchainInstallFailed`] if rustup
    /// cannot install the channel or its components.
    pub fn ensure_installed(&self, executor: &dyn CommandExecutor) -> Result<PinStatus> {
        if !command_succeeds(executor, "rustup", &["--version"]) {
            log::warn!(
                "rust-toolchain.toml pins {} but rustup is unavailable",
                self.channel
            );
            return Ok(PinStatus::RustupUnavailable);
        }

        let was_installed = self.is_installed(executor);
        if !was_installed {
            self.run_rustup(executor, &["toolchain", "install", self.channel.as_str()])?;
        }

        if !self.components.is_empty() {
            let mut args = vec!["component", "add", "--toolchain", self.channel.as_str()];
            args.extend(self.components.iter().map(String::as_str));
            self.run_rustup(executor, &args)?;
        }

        if was_installed {
            Ok(PinStatus::AlreadyInstalled)
        } else {
            Ok(PinStatus::Installed)
        }
    }

    fn is_installed(&self, executor: &dyn CommandExecutor) -> bool {
        command_succeeds(executor, "rustup", &["run", self.channel.as_str(), "rustc", "--version"])
    }

    fn run_rustup(&self, executor: &dyn CommandExecutor, args: &[&str]) -> Result<()> {
        let output = executor.run("rustup", args).map_err(|e| {
            InstallerError::PinnedToolchainInstallFailed {
                toolchain: self.channel.clone(),
                message: e.to_string(),
            }
        })?;

        if output.status.success() {
            return Ok(());
        }

        Err(InstallerError::PinnedToolchainInstallFailed {
            toolchain: self.channel.clone(),
            message: stderr_message(&output),
        })
    }
}

/// Parse `rust-toolchain.toml` contents, accepting both the
/// `[toolchain].channel` layout and a top-level `channel` key.
fn parse_toolchain_config(contents: &str) -> Result<PinnedToolchain> {
    let table: toml::Table =
        contents
            .parse()
            .map_err(|e| InstallerError::InvalidToolchainFile {
                reason: format!("TOML parse error: {e}"),
            })?;

    let section = table.get("toolchain").and_then(toml::Value::as_table);
    let lookup = |key: &str| {
        section
            .and_then(|t| t.get(key))
            .or_else(|| table.get(key))
    };

    let channel = lookup("channel")
        .and_then(toml::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| InstallerError::InvalidToolchainFile {
            reason: "no channel field found in rust-toolchain.toml".to_owned(),
        })?;

    let components = match lookup("components") {
        Some(value) => parse_components_value(value)?,
        None => Vec::new(),
    };

    Ok(PinnedToolchain {
        channel,
        components,
    })
}

fn parse_components_value(value: &toml::Value) -> Result<Vec<String>> {
    let invalid = || InstallerError::InvalidToolchainFile {
        reason: "components must be an array of strings".to_owned(),
    };

    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|component| component.as_str().map(str::to_owned).ok_or_else(invalid))
        .collect()
}
