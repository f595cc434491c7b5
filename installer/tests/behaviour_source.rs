//! Behaviour-driven tests for source synchronisation.
//!
//! A scripted [`GitOps`] stands in for the network so scenarios can simulate
//! an unreachable remote. Progress is captured with a recording sink.

use camino::{Utf8Path, Utf8PathBuf};
use omni_installer::cli::ProgressFormat;
use omni_installer::config::{InstallerConfig, SourceLocation};
use omni_installer::error::{InstallerError, Result as InstallerResult};
use omni_installer::git::GitOps;
use omni_installer::install::ElevationPolicy;
use omni_installer::monitor::MonitorSettings;
use omni_installer::pipeline::Pipeline;
use omni_installer::progress::{Notice, RecordingSink};
use omni_installer::source::{SyncOutcome, SyncedSource};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::Cell;
use std::fs;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Scripted git
// ---------------------------------------------------------------------------

/// Git that either succeeds locally or reports an unreachable remote.
#[derive(Default)]
struct ScriptedGit {
    offline: bool,
    clones: Cell<usize>,
    updates: Cell<usize>,
}

impl ScriptedGit {
    fn unreachable(operation: &'static str) -> InstallerError {
        InstallerError::Git {
            operation,
            message: "fatal: unable to access remote: network unreachable".to_owned(),
        }
    }
}

/// Lay out a finished clone: git metadata plus the project manifest.
fn write_checkout(dir: &Utf8Path) -> std::io::Result<()> {
    fs::create_dir_all(dir.join(".git"))?;
    fs::write(
        dir.join("Cargo.toml"),
        "[package]\nname = \"omniwordlist\"\nversion = \"1.1.0\"\n",
    )
}

impl GitOps for ScriptedGit {
    fn clone_repository(&self, _url: &str, target: &Utf8Path) -> InstallerResult<()> {
        self.clones.set(self.clones.get() + 1);
        if self.offline {
            return Err(Self::unreachable("clone"));
        }
        write_checkout(target)?;
        Ok(())
    }

    fn update_repository(&self, _repo: &Utf8Path) -> InstallerResult<()> {
        self.updates.set(self.updates.get() + 1);
        if self.offline {
            return Err(Self::unreachable("pull"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct SourceWorld {
    _temp: TempDir,
    source_dir: Utf8PathBuf,
    update: bool,
    git: ScriptedGit,
    sink: RecordingSink,
    result: Option<InstallerResult<SyncedSource>>,
}

#[fixture]
fn world() -> SourceWorld {
    let temp = TempDir::new().expect("failed to create temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_owned()).expect("non-UTF8 temp path");
    SourceWorld {
        _temp: temp,
        source_dir: root.join("omniwordlist"),
        update: true,
        git: ScriptedGit::default(),
        sink: RecordingSink::default(),
        result: None,
    }
}

fn config(world: &SourceWorld) -> InstallerConfig {
    InstallerConfig {
        repo_url: "https://example.com/omniwordlist".to_owned(),
        source: SourceLocation::Managed(world.source_dir.clone()),
        install_dir: Utf8PathBuf::from("/usr/local/bin"),
        cargo_bin_dir: Utf8PathBuf::from("/home/user/.cargo/bin"),
        binary_name: "omni".to_owned(),
        jobs: None,
        monitor: MonitorSettings::default(),
        build_timeout: None,
        progress_format: ProgressFormat::Human,
        update: world.update,
        skip_toolchain: false,
        elevation: ElevationPolicy {
            allow_sudo: false,
            interactive: false,
        },
        dry_run: false,
        quiet: false,
    }
}

fn outcome(world: &SourceWorld) -> &SyncOutcome {
    match world.result.as_ref().expect("source has not been synced") {
        Ok(synced) => &synced.outcome,
        Err(e) => panic!("sync failed unexpectedly: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("no source tree exists")]
fn given_no_source(world: &mut SourceWorld) {
    assert!(!world.source_dir.exists());
}

#[given("an existing checkout")]
fn given_existing_checkout(world: &mut SourceWorld) {
    write_checkout(&world.source_dir).expect("failed to create checkout");
}

#[given("the network is unavailable")]
fn given_offline(world: &mut SourceWorld) {
    world.git.offline = true;
}

#[given("updates are disabled")]
fn given_updates_disabled(world: &mut SourceWorld) {
    world.update = false;
}

#[when("the source is synced")]
fn when_source_synced(world: &mut SourceWorld) {
    let config = config(world);
    let mut sink = RecordingSink::default();
    let result = Pipeline::new(&config, &mut sink).sync_source(&world.git);
    world.sink = sink;
    world.result = Some(result);
}

#[then("the source was cloned")]
fn then_cloned(world: &mut SourceWorld) {
    assert_eq!(outcome(world), &SyncOutcome::Cloned);
    assert_eq!(world.git.clones.get(), 1);
}

#[then("the source was updated")]
fn then_updated(world: &mut SourceWorld) {
    assert_eq!(outcome(world), &SyncOutcome::Updated);
    assert_eq!(world.git.updates.get(), 1);
}

#[then("no clone was attempted")]
fn then_no_clone(world: &mut SourceWorld) {
    assert_eq!(world.git.clones.get(), 0);
}

#[then("the source is stale")]
fn then_stale(world: &mut SourceWorld) {
    assert!(
        matches!(outcome(world), SyncOutcome::Stale { .. }),
        "unexpected outcome: {:?}",
        outcome(world)
    );
}

#[then("the existing checkout is reused")]
fn then_reused(world: &mut SourceWorld) {
    assert_eq!(outcome(world), &SyncOutcome::Reused);
    assert_eq!(world.git.updates.get(), 0);
}

#[then("a warning mentions \"{text}\"")]
fn then_warning_mentions(world: &mut SourceWorld, text: String) {
    let warned = world.sink.notices.iter().any(|notice| {
        matches!(notice, Notice::Warning { message } if message.contains(&text))
    });
    assert!(warned, "no warning mentions {text:?}: {:?}", world.sink.notices);
}

#[then("the sync fails with a fetch error")]
fn then_fetch_error(world: &mut SourceWorld) {
    let result = world.result.as_ref().expect("source has not been synced");
    assert!(
        matches!(result, Err(InstallerError::InitialFetchFailed { .. })),
        "unexpected result: {result:?}"
    );
}

#[then("the remedy mentions \"{text}\"")]
fn then_remedy_mentions(world: &mut SourceWorld, text: String) {
    let Some(Err(err)) = world.result.as_ref() else {
        panic!("expected a failed sync");
    };
    let remedy = err.remedy().expect("fetch failures carry a remedy");
    assert!(remedy.contains(&text), "unexpected remedy: {remedy}");
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/source_sync.feature",
    name = "A missing source tree is cloned"
)]
fn scenario_missing_tree_cloned(world: SourceWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/source_sync.feature",
    name = "An existing checkout is refreshed without cloning again"
)]
fn scenario_existing_checkout_refreshed(world: SourceWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/source_sync.feature",
    name = "A failed refresh falls back to the existing checkout"
)]
fn scenario_failed_refresh_tolerated(world: SourceWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/source_sync.feature",
    name = "A failed initial clone stops the run"
)]
fn scenario_failed_clone_fatal(world: SourceWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/source_sync.feature",
    name = "Updates can be disabled"
)]
fn scenario_updates_disabled(world: SourceWorld) {
    let _ = world;
}
