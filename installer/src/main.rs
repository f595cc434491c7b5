//! OmniWordlist installer CLI entrypoint.
//!
//! Builds the omni binary from source and installs it onto `PATH`. Progress
//! goes to stdout; fatal errors and their remedies go to stderr.

use camino::Utf8PathBuf;
use clap::Parser;
use log::LevelFilter;
use omni_installer::cli::{Cli, InstallArgs, ProgressFormat};
use omni_installer::config::InstallerConfig;
use omni_installer::dirs::SystemBaseDirs;
use omni_installer::error::Result;
use omni_installer::interrupt;
use omni_installer::output::{DryRunInfo, write_stderr_line};
use omni_installer::pipeline::run_install;
use omni_installer::progress::{HumanSink, JsonSink, ProgressSink};
use std::io::{IsTerminal, Write};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.install);
    if cli.install.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli.install, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(args: &InstallArgs, stdout: &mut dyn Write) -> Result<()> {
    let cwd = std::env::current_dir()
        .ok()
        .and_then(|dir| Utf8PathBuf::try_from(dir).ok());
    let config = InstallerConfig::resolve(
        args,
        &SystemBaseDirs,
        cwd.as_deref(),
        std::io::stdin().is_terminal(),
    )?;

    if config.dry_run {
        writeln!(stdout, "{}", DryRunInfo { config: &config }.display_text())?;
        return Ok(());
    }

    let cancel = interrupt::install_handler();
    let mut sink = progress_sink(&config, stdout);
    let summary = run_install(&config, sink.as_mut(), cancel)?;
    log::debug!("run finished: {summary:?}");
    Ok(())
}

fn progress_sink<'a>(
    config: &InstallerConfig,
    out: &'a mut dyn Write,
) -> Box<dyn ProgressSink + 'a> {
    match config.progress_format {
        ProgressFormat::Human => Box::new(HumanSink::new(out, config.quiet)),
        ProgressFormat::Json => Box::new(JsonSink::new(out)),
    }
}

fn log_level(args: &InstallArgs) -> LevelFilter {
    if args.quiet {
        return LevelFilter::Error;
    }
    match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(args: &InstallArgs) {
    env_logger::Builder::new()
        .filter_level(log_level(args))
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            if let Some(remedy) = err.remedy() {
                write_stderr_line(stderr, format!("hint: {remedy}"));
            }
            err.exit_code()
        }
    }
}
