//! CLI argument definitions for the omni installer.
//!
//! Every flag is optional: running `omni-installer` with no arguments checks
//! the toolchain, syncs the source, builds, installs and verifies using the
//! defaults below.

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use std::num::NonZeroUsize;

/// Build and install the omni wordlist CLI from source.
#[derive(Parser, Debug)]
#[command(name = "omni-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build and install the omni wordlist CLI from source.\n\n",
    "The installer makes sure a Rust toolchain is available (installing one with ",
    "rustup when needed), clones or refreshes the OmniWordlist source, runs a ",
    "release build while reporting progress, installs the binary and checks ",
    "that it can be found on PATH.\n\n",
    "Re-running is safe: each step detects work that is already done.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install with defaults:\n",
    "    $ omni-installer\n\n",
    "  Install into a user directory without sudo:\n",
    "    $ omni-installer --install-dir ~/.local/bin --no-sudo\n\n",
    "  Build offline from an existing checkout:\n",
    "    $ omni-installer --no-update\n\n",
    "  Emit machine-readable progress for CI:\n",
    "    $ omni-installer --progress-format json\n\n",
    "  Preview without changing anything:\n",
    "    $ omni-installer --dry-run",
))]
pub struct Cli {
    /// Install arguments.
    #[command(flatten)]
    pub install: InstallArgs,
}

/// How progress is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProgressFormat {
    /// Colour-coded lines for a terminal.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// Arguments for the install run.
#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// Git URL of the OmniWordlist repository.
    #[arg(long, value_name = "URL")]
    pub repo_url: Option<String>,

    /// Where the source tree is cloned [default: platform data directory].
    #[arg(short, long, value_name = "DIR")]
    pub source_dir: Option<Utf8PathBuf>,

    /// Directory the binary is installed into [default: /usr/local/bin].
    #[arg(short, long, value_name = "DIR")]
    pub install_dir: Option<Utf8PathBuf>,

    /// Name of the binary the build produces.
    #[arg(long, value_name = "NAME", default_value = "omni")]
    pub binary_name: String,

    /// Number of parallel cargo build jobs.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<NonZeroUsize>,

    /// Print a progress summary every N compiled units.
    #[arg(long, value_name = "N", default_value = "5")]
    pub summary_every: NonZeroUsize,

    /// Number of build output lines shown when the build fails.
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub tail_lines: usize,

    /// Kill the build after this many seconds [default: no limit].
    #[arg(long, value_name = "SECONDS")]
    pub build_timeout: Option<u64>,

    /// Progress output format.
    #[arg(long, value_enum, default_value_t = ProgressFormat::Human)]
    pub progress_format: ProgressFormat,

    /// Do not update an existing source checkout.
    #[arg(long)]
    pub no_update: bool,

    /// Assume cargo is installed and skip the toolchain probe.
    #[arg(long)]
    pub skip_toolchain: bool,

    /// Never use sudo; fall back to manual instructions instead.
    #[arg(long)]
    pub no_sudo: bool,

    /// Show configuration and exit without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Disable coloured output.
    #[arg(long)]
    pub no_color: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Hide build phase lines and all logs except errors.
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Default for InstallArgs {
    /// Creates an `InstallArgs` instance matching a run with no arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use omni_installer::cli::InstallArgs;
    ///
    /// let args = InstallArgs::default();
    /// assert_eq!(args.binary_name, "omni");
    /// assert_eq!(args.summary_every.get(), 5);
    /// assert!(!args.dry_run);
    /// ```
    fn default() -> Self {
        Self {
            repo_url: None,
            source_dir: None,
            install_dir: None,
            binary_name: "omni".to_owned(),
            jobs: None,
            summary_every: crate::monitor::DEFAULT_SUMMARY_EVERY,
            tail_lines: crate::monitor::DEFAULT_TAIL_LINES,
            build_timeout: None,
            progress_format: ProgressFormat::Human,
            no_update: false,
            skip_toolchain: false,
            no_sudo: false,
            dry_run: false,
            no_color: false,
            verbosity: 0,
            quiet: false,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
