//! Source tree synchronisation.
//!
//! The source tree is the only state that persists between runs besides the
//! installed binary. A missing tree is cloned and that first fetch must
//! succeed. An existing tree is refreshed with a fast-forward pull whose
//! failure is tolerated: the build proceeds on the stale checkout, so offline
//! re-runs still work once an initial clone has succeeded.

use crate::error::{InstallerError, Result};
use crate::git::GitOps;
use camino::{Utf8Path, Utf8PathBuf};

/// Repository URL for the omni wordlist CLI.
pub const OMNI_REPO_URL: &str = "https://github.com/aaryanbansal/omniwordlist";

/// Expected package name in Cargo.toml to identify an omni source tree.
pub const OMNI_PACKAGE_NAME: &str = "omniwordlist";

/// How the source tree was obtained for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The installer was started inside a checkout, which is used as-is.
    InTree,
    /// A fresh clone was made.
    Cloned,
    /// The existing checkout was fast-forwarded.
    Updated,
    /// Updates were disabled and the existing checkout is reused.
    Reused,
    /// The refresh failed; the existing (possibly stale) checkout is used.
    Stale {
        /// Why the refresh failed.
        reason: String,
    },
}

/// A source tree ready to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedSource {
    /// Root of the source tree.
    pub path: Utf8PathBuf,
    /// How the tree was obtained.
    pub outcome: SyncOutcome,
}

/// Obtains or refreshes the local source tree.
pub struct SourceSync<'a> {
    git: &'a dyn GitOps,
    update: bool,
}

impl<'a> SourceSync<'a> {
    /// Create a synchroniser. When `update` is false existing checkouts are
    /// reused without contacting the remote.
    #[must_use]
    pub fn new(git: &'a dyn GitOps, update: bool) -> Self {
        Self { git, update }
    }

    /// Clone `remote_url` into `local_path`, or refresh an existing checkout.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InitialFetchFailed`] when the first clone
    /// fails and [`InstallerError::SourceDirNotCheckout`] when `local_path` is
    /// occupied by something other than a git checkout. Refresh failures are
    /// reported through [`SyncOutcome::Stale`] instead.
    pub fn sync_source(&self, remote_url: &str, local_path: &Utf8Path) -> Result<SyncedSource> {
        let outcome = match inspect(local_path)? {
            LocalTree::Missing => self.fetch(remote_url, local_path)?,
            LocalTree::Incomplete => {
                log::warn!("{local_path} holds an unfinished clone; cloning again");
                discard_contents(local_path)?;
                self.fetch(remote_url, local_path)?
            }
            LocalTree::Checkout if self.update => self.refresh(local_path),
            LocalTree::Checkout => SyncOutcome::Reused,
            LocalTree::Occupied => {
                return Err(InstallerError::SourceDirNotCheckout {
                    path: local_path.to_owned(),
                });
            }
        };

        Ok(SyncedSource {
            path: local_path.to_owned(),
            outcome,
        })
    }

    fn fetch(&self, remote_url: &str, local_path: &Utf8Path) -> Result<SyncOutcome> {
        log::info!("cloning {remote_url} into {local_path}");
        self.git
            .clone_repository(remote_url, local_path)
            .map_err(|e| InstallerError::InitialFetchFailed {
                url: remote_url.to_owned(),
                message: e.to_string(),
            })?;
        Ok(SyncOutcome::Cloned)
    }

    fn refresh(&self, local_path: &Utf8Path) -> SyncOutcome {
        match self.git.update_repository(local_path) {
            Ok(()) => SyncOutcome::Updated,
            Err(e) => {
                log::warn!("could not update {local_path}, using existing checkout: {e}");
                SyncOutcome::Stale {
                    reason: e.to_string(),
                }
            }
        }
    }
}

enum LocalTree {
    Missing,
    /// A `.git` directory with no checked-out files, left by a clone that
    /// was killed before it finished.
    Incomplete,
    Checkout,
    Occupied,
}

fn inspect(local_path: &Utf8Path) -> Result<LocalTree> {
    if !local_path.exists() {
        return Ok(LocalTree::Missing);
    }
    if !local_path.is_dir() {
        return Ok(LocalTree::Occupied);
    }

    let entries = std::fs::read_dir(local_path)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()?;
    let has_git = entries.iter().any(|name| name == ".git");
    match (has_git, entries.len()) {
        // git clone accepts an existing empty directory.
        (false, 0) => Ok(LocalTree::Missing),
        (true, 1) => Ok(LocalTree::Incomplete),
        (true, _) if is_source_checkout(local_path) => Ok(LocalTree::Checkout),
        _ => Ok(LocalTree::Occupied),
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
fn discard_contents(dir: &Utf8Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Checks whether the given directory contains the omni source tree.
///
/// A source tree is identified by a `Cargo.toml` file with
/// `package.name = "omniwordlist"`.
#[must_use]
pub fn is_source_checkout(dir: &Utf8Path) -> bool {
    let Ok(content) = std::fs::read_to_string(dir.join("Cargo.toml")) else {
        return false;
    };

    let Ok(manifest) = content.parse::<toml::Table>() else {
        return false;
    };

    manifest
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .is_some_and(|name| name == OMNI_PACKAGE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGitOps;
    use rstest::{fixture, rstest};
    use std::fs;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/omniwordlist";

    /// A temporary directory converted to a UTF-8 path.
    struct TempRoot {
        _temp: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn temp_root() -> TempRoot {
        let temp = TempDir::new().expect("failed to create temp dir");
        let path = Utf8PathBuf::try_from(temp.path().to_owned()).expect("non-UTF8 temp path");
        TempRoot { _temp: temp, path }
    }

    fn make_checkout(dir: &Utf8Path) {
        fs::create_dir_all(dir.join(".git")).expect("failed to create .git");
        write_cargo_toml(dir, OMNI_PACKAGE_NAME);
    }

    #[rstest]
    fn missing_tree_is_cloned(temp_root: TempRoot) {
        let target = temp_root.path.join("omniwordlist");
        let mut git = MockGitOps::new();
        git.expect_clone_repository()
            .withf(|url, _| url == URL)
            .times(1)
            .returning(|_, _| Ok(()));
        git.expect_update_repository().never();

        let synced = SourceSync::new(&git, true)
            .sync_source(URL, &target)
            .expect("clone should succeed");

        assert_eq!(synced.outcome, SyncOutcome::Cloned);
        assert_eq!(synced.path, target);
    }

    #[rstest]
    fn failed_initial_clone_is_fatal(temp_root: TempRoot) {
        let target = temp_root.path.join("omniwordlist");
        let mut git = MockGitOps::new();
        git.expect_clone_repository().times(1).returning(|_, _| {
            Err(InstallerError::Git {
                operation: "clone",
                message: "Could not resolve host".to_owned(),
            })
        });

        let err = SourceSync::new(&git, true)
            .sync_source(URL, &target)
            .expect_err("initial clone failure must be fatal");

        assert!(
            matches!(err, InstallerError::InitialFetchFailed { ref url, ref message } if url == URL && message.contains("Could not resolve host")),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    fn existing_checkout_is_updated(temp_root: TempRoot) {
        make_checkout(&temp_root.path);
        let mut git = MockGitOps::new();
        git.expect_clone_repository().never();
        git.expect_update_repository()
            .times(1)
            .returning(|_| Ok(()));

        let synced = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect("update should succeed");

        assert_eq!(synced.outcome, SyncOutcome::Updated);
    }

    #[rstest]
    fn failed_refresh_is_tolerated(temp_root: TempRoot) {
        make_checkout(&temp_root.path);
        let mut git = MockGitOps::new();
        git.expect_clone_repository().never();
        git.expect_update_repository().times(1).returning(|_| {
            Err(InstallerError::Git {
                operation: "pull",
                message: "network unreachable".to_owned(),
            })
        });

        let synced = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect("refresh failure must not be fatal");

        assert!(
            matches!(synced.outcome, SyncOutcome::Stale { ref reason } if reason.contains("network unreachable")),
            "unexpected outcome: {:?}",
            synced.outcome
        );
    }

    #[rstest]
    fn no_update_reuses_checkout(temp_root: TempRoot) {
        make_checkout(&temp_root.path);
        let mut git = MockGitOps::new();
        git.expect_clone_repository().never();
        git.expect_update_repository().never();

        let synced = SourceSync::new(&git, false)
            .sync_source(URL, &temp_root.path)
            .expect("reuse should succeed");

        assert_eq!(synced.outcome, SyncOutcome::Reused);
    }

    #[rstest]
    fn empty_directory_is_cloned_into(temp_root: TempRoot) {
        let mut git = MockGitOps::new();
        git.expect_clone_repository()
            .times(1)
            .returning(|_, _| Ok(()));

        let synced = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect("clone into empty dir should succeed");

        assert_eq!(synced.outcome, SyncOutcome::Cloned);
    }

    #[rstest]
    fn occupied_directory_is_rejected(temp_root: TempRoot) {
        fs::write(temp_root.path.join("notes.txt"), "hello").expect("failed to write file");
        let mut git = MockGitOps::new();
        git.expect_clone_repository().never();
        git.expect_update_repository().never();

        let err = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect_err("non-checkout directory must be rejected");

        assert!(matches!(err, InstallerError::SourceDirNotCheckout { .. }));
    }

    #[rstest]
    fn partial_clone_is_not_reused(temp_root: TempRoot) {
        fs::create_dir_all(temp_root.path.join(".git/objects/pack"))
            .expect("failed to create .git");
        let mut git = MockGitOps::new();
        git.expect_update_repository().never();
        git.expect_clone_repository()
            .times(1)
            .returning(|_, target: &Utf8Path| {
                assert!(!target.join(".git").exists(), "partial clone was kept");
                Ok(())
            });

        let synced = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect("partial clone should be replaced");

        assert_eq!(synced.outcome, SyncOutcome::Cloned);
    }

    #[rstest]
    fn failed_reclone_of_partial_clone_is_fatal(temp_root: TempRoot) {
        fs::create_dir_all(temp_root.path.join(".git")).expect("failed to create .git");
        let mut git = MockGitOps::new();
        git.expect_update_repository().never();
        git.expect_clone_repository().times(1).returning(|_, _| {
            Err(InstallerError::Git {
                operation: "clone",
                message: "network unreachable".to_owned(),
            })
        });

        let err = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect_err("no usable tree exists");

        assert!(matches!(err, InstallerError::InitialFetchFailed { .. }));
    }

    #[rstest]
    fn foreign_repository_is_rejected(temp_root: TempRoot) {
        fs::create_dir_all(temp_root.path.join(".git")).expect("failed to create .git");
        write_cargo_toml(&temp_root.path, "other-project");
        let mut git = MockGitOps::new();
        git.expect_clone_repository().never();
        git.expect_update_repository().never();

        let err = SourceSync::new(&git, true)
            .sync_source(URL, &temp_root.path)
            .expect_err("another project's checkout must not be built");

        assert!(matches!(err, InstallerError::SourceDirNotCheckout { .. }));
    }

    fn write_cargo_toml(dir: &Utf8Path, package_name: &str) {
        fs::write(
            dir.join("Cargo.toml"),
            format!("[package]\nname = \"{package_name}\"\nversion = \"1.1.0\"\n"),
        )
        .expect("failed to write Cargo.toml");
    }

    #[rstest]
    #[case::omni(OMNI_PACKAGE_NAME, true)]
    #[case::other("other-project", false)]
    fn is_source_checkout_matches_package_name(
        temp_root: TempRoot,
        #[case] package: &str,
        #[case] expected: bool,
    ) {
        write_cargo_toml(&temp_root.path, package);
        assert_eq!(is_source_checkout(&temp_root.path), expected);
    }

    #[rstest]
    fn is_source_checkout_is_false_for_empty_dir(temp_root: TempRoot) {
        assert!(!is_source_checkout(&temp_root.path));
    }
}
