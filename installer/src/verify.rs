//! Post-install verification.
//!
//! A fresh install is often invisible to the current process: the install
//! directory may only be on the user's `PATH` after their shell is reloaded.
//! Verification therefore never fails the run. It reports whether the
//! command resolves, and if not, whether the file at least exists.

use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Why the installed command could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unconfirmed {
    /// The file is installed but its directory is not on `PATH`.
    NotOnPath,
    /// `PATH` resolves the name to another file first.
    Shadowed {
        /// The file that would actually run.
        resolved: PathBuf,
    },
    /// Nothing exists at the install path.
    NotFound,
}

/// Outcome of verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// The command resolves on `PATH` to the installed file.
    Confirmed {
        /// The resolved path.
        path: PathBuf,
    },
    /// The command could not be confirmed.
    Unconfirmed {
        /// The reason.
        reason: Unconfirmed,
        /// The path that was checked.
        expected: Utf8PathBuf,
    },
}

impl VerificationResult {
    /// Returns true for [`VerificationResult::Confirmed`].
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Resolves the installed command the way a shell would.
pub struct Verifier {
    search_path: Option<OsString>,
    cwd: PathBuf,
}

impl Verifier {
    /// Create a verifier that searches `search_path` (the user's `PATH`).
    #[must_use]
    pub fn new(search_path: Option<OsString>, cwd: PathBuf) -> Self {
        Self { search_path, cwd }
    }

    /// Check that `command` resolves to `expected`.
    #[must_use]
    pub fn verify(&self, command: &str, expected: &Utf8Path) -> VerificationResult {
        match which::which_in(command, self.search_path.as_ref(), &self.cwd) {
            Ok(resolved) if same_file(&resolved, expected.as_std_path()) => {
                VerificationResult::Confirmed { path: resolved }
            }
            Ok(resolved) => {
                log::debug!("{command} resolves to {} instead of {expected}", resolved.display());
                unconfirmed(Unconfirmed::Shadowed { resolved }, expected)
            }
            Err(e) => {
                log::debug!("{command} not found on PATH: {e}");
                if expected.is_file() {
                    unconfirmed(Unconfirmed::NotOnPath, expected)
                } else {
                    unconfirmed(Unconfirmed::NotFound, expected)
                }
            }
        }
    }
}

fn unconfirmed(reason: Unconfirmed, expected: &Utf8Path) -> VerificationResult {
    VerificationResult::Unconfirmed {
        reason,
        expected: expected.to_owned(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
