//! Tests for installer CLI parsing and default behaviours.

use super::*;
use rstest::rstest;

#[test]
fn cli_parses_defaults() {
    let cli = Cli::parse_from(["omni-installer"]);
    let args = cli.install;
    let defaults = InstallArgs::default();

    assert!(args.repo_url.is_none());
    assert!(args.source_dir.is_none());
    assert!(args.install_dir.is_none());
    assert_eq!(args.binary_name, defaults.binary_name);
    assert_eq!(args.summary_every, defaults.summary_every);
    assert_eq!(args.tail_lines, defaults.tail_lines);
    assert!(args.build_timeout.is_none());
    assert_eq!(args.progress_format, ProgressFormat::Human);
    assert!(!args.no_update);
    assert!(!args.skip_toolchain);
    assert!(!args.no_sudo);
    assert!(!args.dry_run);
    assert_eq!(args.verbosity, 0);
    assert!(!args.quiet);
}

#[test]
fn cli_parses_directories() {
    let cli = Cli::parse_from([
        "omni-installer",
        "--source-dir",
        "/tmp/omni-src",
        "-i",
        "/home/user/.local/bin",
    ]);
    assert_eq!(cli.install.source_dir, Some(Utf8PathBuf::from("/tmp/omni-src")));
    assert_eq!(
        cli.install.install_dir,
        Some(Utf8PathBuf::from("/home/user/.local/bin"))
    );
}

#[test]
fn cli_parses_build_tuning() {
    let cli = Cli::parse_from([
        "omni-installer",
        "-j",
        "8",
        "--summary-every",
        "10",
        "--tail-lines",
        "20",
        "--build-timeout",
        "600",
    ]);
    assert_eq!(cli.install.jobs.map(NonZeroUsize::get), Some(8));
    assert_eq!(cli.install.summary_every.get(), 10);
    assert_eq!(cli.install.tail_lines, 20);
    assert_eq!(cli.install.build_timeout, Some(600));
}

#[rstest]
#[case::human("human", ProgressFormat::Human)]
#[case::json("json", ProgressFormat::Json)]
fn cli_parses_progress_format(#[case] value: &str, #[case] expected: ProgressFormat) {
    let cli = Cli::parse_from(["omni-installer", "--progress-format", value]);
    assert_eq!(cli.install.progress_format, expected);
}

#[rstest]
#[case::zero_summary(&["omni-installer", "--summary-every", "0"])]
#[case::zero_jobs(&["omni-installer", "-j", "0"])]
#[case::quiet_and_verbose(&["omni-installer", "-q", "-v"])]
#[case::unknown_format(&["omni-installer", "--progress-format", "xml"])]
fn cli_rejects_invalid_arguments(#[case] argv: &[&str]) {
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn cli_counts_verbosity() {
    let cli = Cli::parse_from(["omni-installer", "-vvv"]);
    assert_eq!(cli.install.verbosity, 3);
}

#[test]
fn cli_parses_switches() {
    let cli = Cli::parse_from([
        "omni-installer",
        "--no-update",
        "--skip-toolchain",
        "--no-sudo",
        "--dry-run",
        "--no-color",
    ]);
    assert!(cli.install.no_update);
    assert!(cli.install.skip_toolchain);
    assert!(cli.install.no_sudo);
    assert!(cli.install.dry_run);
    assert!(cli.install.no_color);
}

#[test]
fn cli_definition_is_consistent() {
    use clap::CommandFactory;

    Cli::command().debug_assert();
}
