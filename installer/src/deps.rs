//! External command execution.
//!
//! Every step that shells out (toolchain probes, rustup, sudo) goes through
//! [`CommandExecutor`] so that the decision logic can be exercised without
//! touching the host system.

use crate::error::{InstallerError, Result};
use std::ffi::OsString;
use std::process::{Command, ExitStatus, Output, Stdio};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use omni_installer::deps::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor::default();
    /// let output = executor.run("cargo", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), omni_installer::error::InstallerError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;

    /// Runs a command attached to the caller's terminal and returns its status.
    ///
    /// Used for steps that may prompt the user, such as interactive `sudo`.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning the command.
    fn run_interactive(&self, cmd: &str, args: &[&str]) -> Result<ExitStatus>;

    /// Returns the `PATH` value commands are resolved against.
    fn search_path(&self) -> Option<OsString>;
}

/// Executes commands on the host system.
///
/// By default commands inherit the process `PATH`. After a fresh toolchain
/// install the executor is rebuilt with [`SystemCommandExecutor::with_path`]
/// so that newly installed binaries resolve within the same run.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor {
    path: Option<OsString>,
}

impl SystemCommandExecutor {
    /// Creates an executor that resolves commands against `path`.
    #[must_use]
    pub fn with_path(path: OsString) -> Self {
        Self { path: Some(path) }
    }

    fn command(&self, cmd: &str, args: &[&str]) -> Command {
        let mut command = Command::new(cmd);
        command.args(args);
        if let Some(path) = &self.path {
            command.env("PATH", path);
        }
        command
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        log::trace!("running {cmd} {}", args.join(" "));
        self.command(cmd, args)
            .stdin(Stdio::null())
            .output()
            .map_err(InstallerError::from)
    }

    fn run_interactive(&self, cmd: &str, args: &[&str]) -> Result<ExitStatus> {
        log::trace!("running interactively {cmd} {}", args.join(" "));
        self.command(cmd, args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(InstallerError::from)
    }

    fn search_path(&self) -> Option<OsString> {
        self.path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
    }
}

/// Returns true if the given command executes successfully.
pub fn command_succeeds(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> bool {
    executor.run(cmd, args).is_ok_and(|o| o.status.success())
}

/// Returns the trimmed stderr of a failed command, or a placeholder.
#[must_use]
pub fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "unknown error".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Returns the first line of a command's stdout, trimmed.
#[must_use]
pub fn first_stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned()
}
