//! Output formatting for the installer CLI.
//!
//! This module provides the user-facing text that is not progress: shell
//! snippets for `PATH` changes, remediation for degraded installs and
//! unconfirmed verification, and the dry-run report.

use crate::config::{InstallerConfig, SourceLocation};
use crate::verify::Unconfirmed;
use camino::Utf8Path;
use std::io::Write;

/// Shell configuration snippets for different shells.
#[derive(Debug, Clone)]
pub struct ShellSnippet {
    /// Export line for bash/zsh.
    pub bash: String,
    /// Command for fish shell.
    pub fish: String,
    /// Assignment for PowerShell.
    pub powershell: String,
}

impl ShellSnippet {
    /// Create snippets that put `dir` at the front of `PATH`.
    ///
    /// # Example
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use omni_installer::output::ShellSnippet;
    ///
    /// let snippet = ShellSnippet::new(&Utf8PathBuf::from("/home/user/.local/bin"));
    ///
    /// assert!(snippet.bash.contains("/home/user/.local/bin:$PATH"));
    /// ```
    #[must_use]
    pub fn new(dir: &Utf8Path) -> Self {
        Self {
            bash: format!("export PATH=\"{dir}:$PATH\""),
            fish: format!("fish_add_path \"{dir}\""),
            powershell: format!("$env:Path = \"{dir};\" + $env:Path"),
        }
    }

    /// Format the snippet for display to the user.
    #[must_use]
    pub fn display_text(&self) -> String {
        format!(
            concat!(
                "Add the following to your shell configuration:\n\n",
                "  # bash/zsh (~/.bashrc, ~/.zshrc)\n",
                "  {}\n\n",
                "  # fish (~/.config/fish/config.fish)\n",
                "  {}\n\n",
                "  # PowerShell ($PROFILE)\n",
                "  {}"
            ),
            self.bash, self.fish, self.powershell
        )
    }
}

/// Format a success message after installation.
#[must_use]
pub fn success_message(binary_name: &str, installed: &Utf8Path) -> String {
    format!("Installed {binary_name} to {installed}")
}

/// Instructions for finishing an install that no strategy could complete.
#[must_use]
pub fn manual_install_text(artifact: &Utf8Path, destination: &Utf8Path) -> String {
    let mut text = format!(
        concat!(
            "The binary was built but could not be installed automatically.\n",
            "Install it yourself with:\n\n",
            "  sudo install -m 755 \"{artifact}\" \"{destination}\"\n"
        ),
        artifact = artifact,
        destination = destination,
    );
    if let Some(dir) = artifact.parent() {
        text.push_str("\nOr use it where it is. ");
        text.push_str(&ShellSnippet::new(dir).display_text());
    }
    text
}

/// Remediation for an installed command that could not be confirmed.
#[must_use]
pub fn unconfirmed_text(reason: &Unconfirmed, expected: &Utf8Path) -> String {
    match reason {
        Unconfirmed::NotOnPath => {
            let mut text = format!(
                "{expected} is installed but its directory is not on PATH in this shell.\n"
            );
            text.push_str("Open a new shell, or ");
            if let Some(dir) = expected.parent() {
                text.push_str(&ShellSnippet::new(dir).display_text());
            }
            text
        }
        Unconfirmed::Shadowed { resolved } => format!(
            concat!(
                "{resolved} is found on PATH before {expected}.\n",
                "Remove the other copy or move {dir} earlier in PATH."
            ),
            resolved = resolved.display(),
            expected = expected,
            dir = expected.parent().unwrap_or(expected),
        ),
        Unconfirmed::NotFound => {
            format!("{expected} does not exist; see the install step above.")
        }
    }
}

/// Configuration information for dry-run output.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use omni_installer::cli::InstallArgs;
/// use omni_installer::config::{InstallerConfig, SourceLocation};
/// use omni_installer::dirs::SystemBaseDirs;
/// use omni_installer::output::DryRunInfo;
///
/// let args = InstallArgs {
///     source_dir: Some(Utf8PathBuf::from("/tmp/omniwordlist")),
///     ..InstallArgs::default()
/// };
/// # let Ok(config) = InstallerConfig::resolve(&args, &SystemBaseDirs, None, false) else {
/// #     return;
/// # };
/// let output = DryRunInfo { config: &config }.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("/tmp/omniwordlist"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// The resolved configuration.
    pub config: &'a InstallerConfig,
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let config = self.config;
        let source = match &config.source {
            SourceLocation::Managed(path) => format!("{path} (from {})", config.repo_url),
            SourceLocation::InTree(path) => format!("{path} (current checkout)"),
        };
        let mut lines = vec![
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Source: {source}"),
            format!("Install directory: {}", config.install_dir),
            format!("Binary name: {}", config.binary_name),
            format!("Cargo bin directory: {}", config.cargo_bin_dir),
            format!("Update existing checkout: {}", config.update),
            format!("Skip toolchain check: {}", config.skip_toolchain),
            format!("Allow sudo: {}", config.elevation.allow_sudo),
            format!(
                "Summary every: {} units",
                config.monitor.summary_every.get()
            ),
            format!("Failure tail: {} lines", config.monitor.tail_lines),
        ];

        if let Some(jobs) = config.jobs {
            lines.push(format!("Parallel jobs: {jobs}"));
        }
        if let Some(timeout) = config.build_timeout {
            lines.push(format!("Build timeout: {}s", timeout.as_secs()));
        }

        lines.push(String::new());
        lines.push("Steps:".to_owned());
        for step in planned_steps(config) {
            lines.push(format!("  - {step}"));
        }

        lines.join("\n")
    }
}

fn planned_steps(config: &InstallerConfig) -> Vec<&'static str> {
    let mut steps = Vec::with_capacity(5);
    if !config.skip_toolchain {
        steps.push("check Rust toolchain (install with rustup if missing)");
    }
    match (&config.source, config.update) {
        (SourceLocation::InTree(_), _) => steps.push("use the current checkout"),
        (SourceLocation::Managed(_), true) => steps.push("clone or update the source"),
        (SourceLocation::Managed(_), false) => steps.push("clone the source if missing"),
    }
    steps.push("cargo build --release");
    steps.push("install the binary");
    steps.push("verify the command is on PATH");
    steps
}

/// Write a line to stderr, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}
