//! Git operations for cloning and updating the source repository.
//!
//! Operations have a fixed timeout so a stalled network connection cannot
//! hang the installer before the build even starts.

use crate::error::{InstallerError, Result};
use camino::Utf8Path;
use std::ffi::OsString;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Default timeout for git operations (5 minutes).
const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Clone and pull operations used by source synchronisation.
#[cfg_attr(test, mockall::automock)]
pub trait GitOps {
    /// Clones `url` into `target`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `InstallerError::Git` if the clone fails or times out.
    fn clone_repository(&self, url: &str, target: &Utf8Path) -> Result<()>;

    /// Fast-forwards an existing checkout at `repo`.
    ///
    /// # Errors
    ///
    /// Returns `InstallerError::Git` if the pull fails or times out.
    fn update_repository(&self, repo: &Utf8Path) -> Result<()>;
}

/// Runs the `git` executable found on the search path.
#[derive(Debug, Clone, Default)]
pub struct SystemGit {
    path: Option<OsString>,
}

impl SystemGit {
    /// Create a git runner that resolves `git` against `path` when given.
    #[must_use]
    pub fn new(path: Option<OsString>) -> Self {
        Self { path }
    }

    /// Runs a git command with a timeout.
    ///
    /// Returns the command output if it completes within the timeout, or an
    /// error if the command times out or fails to start.
    fn run_with_timeout(
        &self,
        args: &[&str],
        working_dir: Option<&Utf8Path>,
        operation: &'static str,
    ) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0");

        if let Some(path) = &self.path {
            cmd.env("PATH", path);
        }
        if let Some(dir) = working_dir {
            cmd.current_dir(dir.as_std_path());
        }

        let mut child = cmd.spawn().map_err(|e| InstallerError::Git {
            operation,
            message: format!("failed to run git: {e}"),
        })?;

        if let Some(status) = child.wait_timeout(GIT_TIMEOUT)? {
            let stdout = child
                .stdout
                .take()
                .map(std::io::read_to_string)
                .transpose()?
                .unwrap_or_default();
            let stderr = child
                .stderr
                .take()
                .map(std::io::read_to_string)
                .transpose()?
                .unwrap_or_default();

            return Ok(Output {
                status,
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            });
        }

        if let Err(e) = child.kill() {
            log::debug!("failed to kill timed out git {operation}: {e}");
        }
        if let Err(e) = child.wait() {
            log::debug!("failed to reap timed out git {operation}: {e}");
        }
        Err(InstallerError::Git {
            operation,
            message: format!(
                "operation timed out after {} seconds",
                GIT_TIMEOUT.as_secs()
            ),
        })
    }
}

impl GitOps for SystemGit {
    fn clone_repository(&self, url: &str, target: &Utf8Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existed = target.exists();
        let cloned = self
            .run_with_timeout(
                &["clone", "--depth", "1", url, target.as_str()],
                None,
                "clone",
            )
            .and_then(|output| check_git_output(&output, "clone"));
        if cloned.is_err() {
            discard_failed_clone(target, existed);
        }
        cloned
    }

    fn update_repository(&self, repo: &Utf8Path) -> Result<()> {
        let output = self.run_with_timeout(&["pull", "--ff-only"], Some(repo), "pull")?;
        check_git_output(&output, "pull")
    }
}

/// Remove what a failed or killed clone left at `target`.
///
/// A directory that existed beforehand was empty, so only its `.git` is
/// removed.
fn discard_failed_clone(target: &Utf8Path, existed: bool) {
    let leftover = if existed {
        target.join(".git")
    } else {
        target.to_owned()
    };
    if !leftover.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(&leftover) {
        log::warn!("could not remove incomplete clone at {leftover}: {e}");
    }
}

fn check_git_output(output: &Output, operation: &'static str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(InstallerError::Git {
        operation,
        message: stderr.trim().to_owned(),
    })
}
