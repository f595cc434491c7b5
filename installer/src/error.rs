//! Error types for the omni installer.
//!
//! This module defines semantic error variants for every fatal failure in the
//! install pipeline. Each fatal variant carries enough context to print a
//! specific, actionable remedy via [`InstallerError::remedy`] instead of a raw
//! error chain.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur during the installation process.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The toolchain could not be probed (for example rustup failed to start).
    #[error("toolchain detection failed: {reason}")]
    ToolchainDetection {
        /// Description of why detection failed.
        reason: String,
    },

    /// The vendor install routine for the Rust toolchain failed.
    #[error("failed to install the Rust toolchain: {message}")]
    ToolchainInstallFailed {
        /// Description of the installation failure.
        message: String,
    },

    /// The install routine reported success but `cargo` is still not visible.
    #[error("cargo is still not available after installing the toolchain")]
    ToolchainNotVisible {
        /// Directory that was added to the search path.
        cargo_bin_dir: Utf8PathBuf,
    },

    /// A toolchain pinned by the source tree could not be installed.
    #[error("failed to install pinned toolchain {toolchain}: {message}")]
    PinnedToolchainInstallFailed {
        /// The pinned channel.
        toolchain: String,
        /// Description of the failure.
        message: String,
    },

    /// The source tree's `rust-toolchain.toml` could not be parsed.
    #[error("invalid rust-toolchain.toml: {reason}")]
    InvalidToolchainFile {
        /// Description of the parse error.
        reason: String,
    },

    /// The first clone of the source repository failed.
    #[error("could not fetch source from {url}: {message}")]
    InitialFetchFailed {
        /// Repository URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A git operation failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git operation that failed (clone, pull).
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The source directory exists but does not hold the omni source tree.
    #[error("{path} exists but is not a checkout of the omni source")]
    SourceDirNotCheckout {
        /// Path to the offending directory.
        path: Utf8PathBuf,
    },

    /// The build command could not be started.
    #[error("failed to start build command `{command}`: {reason}")]
    BuildSpawn {
        /// Rendered build command.
        command: String,
        /// Description of the spawn failure.
        reason: String,
    },

    /// The build process finished unsuccessfully.
    #[error("build failed ({cause})")]
    BuildFailed {
        /// Human-readable failure cause (exit code or signal).
        cause: String,
        /// Whether a C linker was found during the prerequisite check.
        linker_available: bool,
    },

    /// The user interrupted the run.
    #[error("interrupted")]
    Interrupted,

    /// The build exceeded the configured timeout.
    #[error("build timed out after {seconds} seconds")]
    BuildTimedOut {
        /// The configured timeout in seconds.
        seconds: u64,
    },

    /// The build succeeded but the expected binary is missing.
    #[error("build succeeded but {path} was not produced")]
    ArtifactMissing {
        /// Expected artifact path.
        path: Utf8PathBuf,
    },

    /// A required platform directory could not be determined.
    #[error("could not determine {what}")]
    DirectoryUnavailable {
        /// Which directory was requested.
        what: &'static str,
    },

    /// A path could not be represented as UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Lossy rendering of the path.
        path: String,
    },

    /// An output classification pattern failed to compile.
    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl InstallerError {
    /// Returns the actionable remedy printed alongside the error, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use omni_installer::error::InstallerError;
    ///
    /// let err = InstallerError::InitialFetchFailed {
    ///     url: "https://example.com/omni".to_owned(),
    ///     message: "could not resolve host".to_owned(),
    /// };
    /// assert!(err.remedy().is_some_and(|hint| hint.contains("internet connection")));
    /// ```
    #[must_use]
    pub fn remedy(&self) -> Option<String> {
        let hint = match self {
            Self::ToolchainDetection { .. } | Self::ToolchainInstallFailed { .. } => {
                "check your internet connection, or install Rust manually from https://rustup.rs"
                    .to_owned()
            }
            Self::ToolchainNotVisible { cargo_bin_dir } => {
                format!("open a new shell or add {cargo_bin_dir} to PATH, then re-run")
            }
            Self::PinnedToolchainInstallFailed { toolchain, .. } => {
                format!("run: rustup toolchain install {toolchain}")
            }
            Self::InitialFetchFailed { .. } => {
                "check your internet connection and that git is installed".to_owned()
            }
            Self::SourceDirNotCheckout { path } => {
                format!("remove {path} or pass --source-dir to use another location")
            }
            Self::BuildSpawn { .. } => "make sure cargo is on PATH and re-run".to_owned(),
            Self::BuildFailed {
                linker_available: false,
                ..
            } => "install a C-capable toolchain (e.g. build-essential or Xcode command line tools)"
                .to_owned(),
            Self::BuildFailed { .. } => {
                "see the build output above; re-run with -v for more detail".to_owned()
            }
            Self::BuildTimedOut { .. } => {
                "raise --build-timeout or omit it to let the build run to completion".to_owned()
            }
            Self::ArtifactMissing { .. } => {
                "check that --binary-name matches the binary target of the project".to_owned()
            }
            Self::DirectoryUnavailable { .. } => {
                "set HOME or pass the directory explicitly on the command line".to_owned()
            }
            _ => return None,
        };
        Some(hint)
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
