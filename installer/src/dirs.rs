//! Directory resolution abstraction for platform-specific paths.
//!
//! [`BaseDirs`] hides `directories-next` behind a trait so that path
//! derivation can be tested with [`MockBaseDirs`] instead of the real home
//! directory.

use std::path::PathBuf;

/// Platform directory lookups used by the installer.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Returns the user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Returns the per-user data directory (e.g. `~/.local/share`).
    fn data_dir(&self) -> Option<PathBuf>;

    /// Returns the cargo home directory (`$CARGO_HOME` or `~/.cargo`).
    fn cargo_home(&self) -> Option<PathBuf>;
}

/// Resolves directories from the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn data_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn cargo_home(&self) -> Option<PathBuf> {
        std::env::var_os("CARGO_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.home_dir().map(|home| home.join(".cargo")))
    }
}
