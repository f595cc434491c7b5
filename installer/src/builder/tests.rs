//! Tests for the build driver.

use super::*;
use crate::classify::CargoLineClassifier;
use crate::monitor::{MonitorSettings, MonitorState};
use crate::progress::{Notice, RecordingSink};
use rstest::rstest;

fn config(source_dir: &str) -> BuildConfig {
    BuildConfig {
        cargo: "cargo".to_owned(),
        source_dir: Utf8PathBuf::from(source_dir),
        binary_name: "omni".to_owned(),
        jobs: None,
        timeout: None,
        search_path: None,
    }
}

#[test]
fn command_builds_release_with_jobs() {
    let builder = Builder::new(BuildConfig {
        jobs: NonZeroUsize::new(4),
        ..config("/src/omniwordlist")
    });

    assert_eq!(
        render_command(&builder.command()),
        "cargo build --release -j 4"
    );
}

#[test]
fn command_pins_target_dir_and_path() {
    let builder = Builder::new(BuildConfig {
        search_path: Some(OsString::from("/opt/cargo/bin:/usr/bin")),
        ..config("/src/omniwordlist")
    });
    let command = builder.command();
    let envs: Vec<(String, String)> = command
        .get_envs()
        .filter_map(|(key, value)| {
            Some((
                key.to_string_lossy().into_owned(),
                value?.to_string_lossy().into_owned(),
            ))
        })
        .collect();

    assert!(envs.contains(&(
        "CARGO_TARGET_DIR".to_owned(),
        "/src/omniwordlist/target".to_owned()
    )));
    assert!(envs.contains(&("PATH".to_owned(), "/opt/cargo/bin:/usr/bin".to_owned())));
    assert_eq!(
        command.get_current_dir(),
        Some(std::path::Path::new("/src/omniwordlist"))
    );
}

#[test]
fn artifact_lives_under_release() {
    let builder = Builder::new(config("/src/omniwordlist"));
    let expected = format!(
        "/src/omniwordlist/target/release/omni{}",
        std::env::consts::EXE_SUFFIX
    );
    assert_eq!(builder.artifact_path().as_str(), expected);
}

fn report_with(exit: ChildExit) -> BuildReport {
    let classifier = CargoLineClassifier::new().expect("rules should compile");
    let mut sink = RecordingSink::default();
    let monitor = BuildMonitor::new(&classifier, &mut sink, MonitorSettings::default());
    monitor.finish(exit)
}

#[rstest]
#[case::interrupted(ChildExit::Interrupted)]
#[case::timed_out(ChildExit::TimedOut(Duration::from_secs(2)))]
#[case::failed(ChildExit::Code(101))]
fn check_report_maps_failures(#[case] exit: ChildExit) {
    let err = check_report(&report_with(exit), false).expect_err("failure should map to error");
    match exit {
        ChildExit::Interrupted => assert!(matches!(err, InstallerError::Interrupted)),
        ChildExit::TimedOut(_) => {
            assert!(matches!(err, InstallerError::BuildTimedOut { seconds: 2 }));
        }
        _ => assert!(matches!(
            err,
            InstallerError::BuildFailed { ref cause, linker_available: false } if cause == "exit code 101"
        )),
    }
}

#[test]
fn check_report_accepts_success() {
    assert!(check_report(&report_with(ChildExit::Code(0)), true).is_ok());
}

#[test]
fn spawn_failure_is_reported() {
    let classifier = CargoLineClassifier::new().expect("rules should compile");
    let mut sink = RecordingSink::default();
    let monitor = BuildMonitor::new(&classifier, &mut sink, MonitorSettings::default());
    let cancel = AtomicBool::new(false);

    let err = stream_build(
        Command::new("definitely-not-a-real-build-tool"),
        monitor,
        &cancel,
        None,
    )
    .expect_err("missing program should fail to spawn");

    assert!(matches!(err, InstallerError::BuildSpawn { .. }));
}

#[cfg(unix)]
mod process {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    fn run_script(
        script: &str,
        cancel: &AtomicBool,
        timeout: Option<Duration>,
    ) -> (BuildReport, RecordingSink) {
        let classifier = CargoLineClassifier::new().expect("rules should compile");
        let mut sink = RecordingSink::default();
        let report = {
            let monitor = BuildMonitor::new(&classifier, &mut sink, MonitorSettings::default());
            stream_build(sh(script), monitor, cancel, timeout).expect("script should spawn")
        };
        (report, sink)
    }

    #[test]
    fn streams_stdout_and_stderr() {
        let cancel = AtomicBool::new(false);
        let (report, sink) = run_script(
            "echo 'Compiling a'; echo 'Compiling b' >&2; echo 'Finished'",
            &cancel,
            None,
        );

        assert!(report.succeeded());
        assert_eq!(report.progress.compiled_count(), 2);
        assert!(report.saw_finished);
        assert!(
            sink.notices
                .iter()
                .any(|notice| matches!(notice, Notice::BuildStarted { command } if command.starts_with("sh -c")))
        );
    }

    #[test]
    fn non_zero_exit_fails_with_tail() {
        let cancel = AtomicBool::new(false);
        let (report, _sink) = run_script("echo 'Compiling a'; exit 3", &cancel, None);

        assert_eq!(report.state(), MonitorState::Failed);
        assert_eq!(report.status(), TerminalStatus::Failed(ChildExit::Code(3)));
        assert_eq!(report.tail, vec!["Compiling a"]);
    }

    #[test]
    fn silent_success_is_success() {
        let cancel = AtomicBool::new(false);
        let (report, sink) = run_script("exit 0", &cancel, None);

        assert!(report.succeeded());
        assert!(sink.summary_counts().is_empty());
    }

    #[test]
    fn timeout_kills_the_child() {
        let cancel = AtomicBool::new(false);
        let started = Instant::now();
        let (report, _sink) = run_script(
            "echo 'Compiling slow'; exec sleep 30",
            &cancel,
            Some(Duration::from_millis(300)),
        );

        assert_eq!(
            report.status(),
            TerminalStatus::Failed(ChildExit::TimedOut(Duration::from_millis(300)))
        );
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn preset_cancel_flag_never_starts_the_build() {
        let temp = tempfile::TempDir::new().expect("failed to create temp dir");
        let marker = temp.path().join("started");
        let cancel = AtomicBool::new(true);
        let (report, sink) = run_script(
            &format!("touch '{}'; exec sleep 30", marker.display()),
            &cancel,
            None,
        );

        assert_eq!(
            report.status(),
            TerminalStatus::Failed(ChildExit::Interrupted)
        );
        assert!(!marker.exists());
        assert!(
            !sink
                .notices
                .iter()
                .any(|notice| matches!(notice, Notice::BuildStarted { .. }))
        );
    }

    #[test]
    fn timeout_kills_processes_started_by_the_build() {
        let temp = tempfile::TempDir::new().expect("failed to create temp dir");
        let marker = temp.path().join("late-write");
        let cancel = AtomicBool::new(false);
        let script = format!(
            "(sleep 1; touch '{}') & echo 'Compiling slow'; exec sleep 30",
            marker.display()
        );

        let (report, _sink) = run_script(&script, &cancel, Some(Duration::from_millis(300)));
        std::thread::sleep(Duration::from_millis(1500));

        assert!(matches!(
            report.status(),
            TerminalStatus::Failed(ChildExit::TimedOut(_))
        ));
        assert!(!marker.exists(), "a process started by the build survived");
    }

    #[test]
    fn build_reports_missing_artifact() {
        let temp = tempfile::TempDir::new().expect("failed to create temp dir");
        let source = Utf8PathBuf::try_from(temp.path().to_owned()).expect("non-UTF8 temp path");
        let builder = Builder::new(BuildConfig {
            cargo: "true".to_owned(),
            ..config(source.as_str())
        });
        let classifier = CargoLineClassifier::new().expect("rules should compile");
        let mut sink = RecordingSink::default();
        let monitor = BuildMonitor::new(&classifier, &mut sink, MonitorSettings::default());
        let cancel = AtomicBool::new(false);

        let err = builder
            .build(monitor, &cancel, true)
            .expect_err("no binary was produced");

        assert!(matches!(err, InstallerError::ArtifactMissing { .. }));
    }

    #[test]
    fn build_returns_artifact_path() {
        let temp = tempfile::TempDir::new().expect("failed to create temp dir");
        let source = Utf8PathBuf::try_from(temp.path().to_owned()).expect("non-UTF8 temp path");
        let builder = Builder::new(BuildConfig {
            cargo: "true".to_owned(),
            ..config(source.as_str())
        });
        let artifact = builder.artifact_path();
        std::fs::create_dir_all(artifact.parent().expect("artifact has a parent"))
            .expect("failed to create release dir");
        std::fs::write(&artifact, "#!/bin/sh\n").expect("failed to write artifact");

        let classifier = CargoLineClassifier::new().expect("rules should compile");
        let mut sink = RecordingSink::default();
        let monitor = BuildMonitor::new(&classifier, &mut sink, MonitorSettings::default());
        let cancel = AtomicBool::new(false);

        let built = builder
            .build(monitor, &cancel, true)
            .expect("build should succeed");

        assert_eq!(built, artifact);
    }
}
