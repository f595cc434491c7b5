//! Installation of the built binary.
//!
//! [`PrivilegedInstaller`] tries an ordered list of [`InstallStrategy`]
//! values and stops at the first that works. Running out of strategies is a
//! degraded outcome rather than an error: the build artifact is still usable
//! and the user is told how to finish the install by hand.

use crate::deps::{CommandExecutor, command_succeeds, stderr_message};
use crate::error::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;

/// Default install directory.
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

const PROBE_FILE: &str = ".omni-installer-probe";

/// Ways of placing the binary, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// Plain copy; the install directory is writable by the current user.
    Unprivileged,
    /// `sudo -n`, relying on cached credentials or a passwordless rule.
    SudoNonInteractive,
    /// `sudo` attached to the terminal, prompting once for a password.
    SudoInteractive,
    /// Nothing could write the file; print instructions instead.
    Manual,
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unprivileged => "direct copy",
            Self::SudoNonInteractive => "sudo (cached credentials)",
            Self::SudoInteractive => "sudo (password prompt)",
            Self::Manual => "manual",
        })
    }
}

/// Which elevation mechanisms may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevationPolicy {
    /// Whether sudo may be used at all.
    pub allow_sudo: bool,
    /// Whether the user can answer a password prompt (stdin is a terminal).
    pub interactive: bool,
}

/// Where the binary goes and how it will get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTarget {
    install_dir: Utf8PathBuf,
    destination: Utf8PathBuf,
    writable: bool,
    strategies: Vec<InstallStrategy>,
}

impl InstallationTarget {
    /// Inspect `install_dir` and plan the strategies to try.
    ///
    /// Writability is probed by creating (and removing) a file, since
    /// permission bits alone do not account for ACLs or read-only mounts.
    #[must_use]
    pub fn probe(install_dir: &Utf8Path, binary_name: &str, policy: ElevationPolicy) -> Self {
        let writable = probe_writable(install_dir);
        log::debug!("{install_dir} writable: {writable}");

        let mut strategies = Vec::with_capacity(4);
        if writable {
            strategies.push(InstallStrategy::Unprivileged);
        }
        if policy.allow_sudo {
            strategies.push(InstallStrategy::SudoNonInteractive);
            if policy.interactive {
                strategies.push(InstallStrategy::SudoInteractive);
            }
        }
        strategies.push(InstallStrategy::Manual);

        Self {
            install_dir: install_dir.to_owned(),
            destination: install_dir.join(format!("{binary_name}{}", std::env::consts::EXE_SUFFIX)),
            writable,
            strategies,
        }
    }

    /// The directory the binary is installed into.
    #[must_use]
    pub fn install_dir(&self) -> &Utf8Path {
        &self.install_dir
    }

    /// Full path of the installed binary.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    /// Whether the current user can write to the install directory.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Strategies that will be attempted, in order.
    #[must_use]
    pub fn strategies(&self) -> &[InstallStrategy] {
        &self.strategies
    }

    /// The first strategy that will be attempted.
    #[must_use]
    pub fn chosen(&self) -> InstallStrategy {
        self.strategies
            .first()
            .copied()
            .unwrap_or(InstallStrategy::Manual)
    }
}

fn probe_writable(dir: &Utf8Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(PROBE_FILE);
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&probe) {
                log::debug!("failed to remove {probe}: {e}");
            }
            true
        }
        Err(_) => false,
    }
}

/// Result of an installation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The binary was installed.
    Installed {
        /// Installed path.
        path: Utf8PathBuf,
        /// Strategy that succeeded.
        strategy: InstallStrategy,
    },
    /// No strategy could install the binary; the artifact must be used or
    /// copied by hand.
    Degraded {
        /// The built binary, still usable in place.
        artifact: Utf8PathBuf,
        /// Where the binary should have gone.
        destination: Utf8PathBuf,
        /// Why each attempted strategy failed.
        reasons: Vec<String>,
    },
}

/// Copies the built binary into place, escalating privileges as allowed.
pub struct PrivilegedInstaller<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> PrivilegedInstaller<'a> {
    /// Create an installer that runs sudo through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Install `binary` at the target's destination.
    ///
    /// Every successful strategy leaves the file with mode `0755`.
    ///
    /// # Errors
    ///
    /// Only returns an error if `binary` does not exist; failing strategies
    /// produce [`InstallOutcome::Degraded`].
    pub fn install(
        &self,
        binary: &Utf8Path,
        target: &InstallationTarget,
    ) -> Result<InstallOutcome> {
        fs::metadata(binary)?;

        let mut reasons = Vec::new();
        for &strategy in target.strategies() {
            match self.attempt(strategy, binary, target.destination()) {
                Ok(true) => {
                    log::info!("installed {} using {strategy}", target.destination());
                    return Ok(InstallOutcome::Installed {
                        path: target.destination().to_owned(),
                        strategy,
                    });
                }
                Ok(false) => {}
                Err(reason) => {
                    log::warn!("{strategy} install failed: {reason}");
                    reasons.push(format!("{strategy}: {reason}"));
                }
            }
        }

        Ok(InstallOutcome::Degraded {
            artifact: binary.to_owned(),
            destination: target.destination().to_owned(),
            reasons,
        })
    }

    /// Returns `Ok(true)` on success, `Ok(false)` for the manual strategy,
    /// and `Err` with a reason when the strategy failed.
    fn attempt(
        &self,
        strategy: InstallStrategy,
        binary: &Utf8Path,
        destination: &Utf8Path,
    ) -> std::result::Result<bool, String> {
        match strategy {
            InstallStrategy::Unprivileged => {
                copy_executable(binary, destination).map_err(|e| e.to_string())?;
            }
            InstallStrategy::SudoNonInteractive => {
                if !command_succeeds(self.executor, "sudo", &["-n", "true"]) {
                    return Err("no cached sudo credentials".to_owned());
                }
                let output = self
                    .executor
                    .run(
                        "sudo",
                        &["-n", "install", "-m", "755", binary.as_str(), destination.as_str()],
                    )
                    .map_err(|e| e.to_string())?;
                if !output.status.success() {
                    return Err(stderr_message(&output));
                }
            }
            InstallStrategy::SudoInteractive => {
                let status = self
                    .executor
                    .run_interactive(
                        "sudo",
                        &["install", "-m", "755", binary.as_str(), destination.as_str()],
                    )
                    .map_err(|e| e.to_string())?;
                if !status.success() {
                    return Err(format!("sudo exited with {status}"));
                }
            }
            InstallStrategy::Manual => return Ok(false),
        }
        Ok(true)
    }
}

/// Copy `source` to `destination` through a temporary file in the same
/// directory, so a running copy of the old binary is replaced atomically.
fn copy_executable(source: &Utf8Path, destination: &Utf8Path) -> std::io::Result<()> {
    let staging = destination.with_file_name(format!(
        ".{}.partial",
        destination.file_name().unwrap_or("omni")
    ));
    let result = fs::copy(source, &staging)
        .and_then(|_| set_executable(&staging))
        .and_then(|()| fs::rename(&staging, destination));
    if result.is_err() && staging.exists() {
        if let Err(e) = fs::remove_file(&staging) {
            log::debug!("failed to remove {staging}: {e}");
        }
    }
    result
}

#[cfg(unix)]
fn set_executable(path: &Utf8Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Utf8Path) -> std::io::Result<()> {
    Ok(())
}
