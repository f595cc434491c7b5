//! Release build of the omni source tree.
//!
//! The build runs as a child process whose stdout and stderr are read line by
//! line on two reader threads and funnelled through a channel, so progress is
//! reported while cargo is still running rather than when it exits. The
//! calling thread owns the [`BuildMonitor`] and polls for interrupts and the
//! optional deadline between lines.

use crate::error::{InstallerError, Result};
use crate::monitor::{BuildMonitor, BuildReport, ChildExit, TerminalStatus};
use camino::Utf8PathBuf;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::num::NonZeroUsize;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the build loop checks for interrupts and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for the build process.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// The cargo program to run (bare name or absolute path).
    pub cargo: String,
    /// Root of the source tree.
    pub source_dir: Utf8PathBuf,
    /// Name of the binary the build must produce.
    pub binary_name: String,
    /// Number of parallel build jobs (None for cargo default).
    pub jobs: Option<NonZeroUsize>,
    /// Kill the build after this long (None to wait indefinitely).
    pub timeout: Option<Duration>,
    /// `PATH` for the child, when it differs from the installer's own.
    pub search_path: Option<OsString>,
}

/// Runs the release build and locates its artifact.
pub struct Builder {
    config: BuildConfig,
}

impl Builder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Directory cargo is told to write build output to.
    #[must_use]
    pub fn target_dir(&self) -> Utf8PathBuf {
        self.config.source_dir.join("target")
    }

    /// Expected path of the release binary.
    #[must_use]
    pub fn artifact_path(&self) -> Utf8PathBuf {
        self.target_dir().join("release").join(format!(
            "{}{}",
            self.config.binary_name,
            std::env::consts::EXE_SUFFIX
        ))
    }

    /// The cargo invocation for a release build.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.cargo);
        cmd.args(["build", "--release"]);

        if let Some(jobs) = self.config.jobs {
            cmd.args(["-j", &jobs.to_string()]);
        }

        // Pin the target dir so the artifact location does not depend on the
        // user's environment.
        cmd.env("CARGO_TARGET_DIR", self.target_dir().as_str());
        cmd.env("CARGO_TERM_COLOR", "never");
        if let Some(path) = &self.config.search_path {
            cmd.env("PATH", path);
        }
        cmd.current_dir(self.config.source_dir.as_std_path());
        cmd
    }

    /// Build the binary, streaming progress through `monitor`.
    ///
    /// Returns the path of the produced binary.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::BuildFailed`], [`InstallerError::Interrupted`]
    /// or [`InstallerError::BuildTimedOut`] when the build does not succeed,
    /// and [`InstallerError::ArtifactMissing`] when it succeeds without
    /// producing the binary.
    pub fn build(
        &self,
        monitor: BuildMonitor<'_>,
        cancel: &AtomicBool,
        linker_available: bool,
    ) -> Result<Utf8PathBuf> {
        let report = stream_build(self.command(), monitor, cancel, self.config.timeout)?;
        check_report(&report, linker_available)?;

        let artifact = self.artifact_path();
        if !artifact.is_file() {
            return Err(InstallerError::ArtifactMissing { path: artifact });
        }
        Ok(artifact)
    }
}

/// Map a finished build to the installer's error taxonomy.
///
/// # Errors
///
/// Returns an error for every terminal status other than success.
pub fn check_report(report: &BuildReport, linker_available: bool) -> Result<()> {
    match report.status() {
        TerminalStatus::Succeeded => Ok(()),
        TerminalStatus::Failed(ChildExit::Interrupted) => Err(InstallerError::Interrupted),
        TerminalStatus::Failed(ChildExit::TimedOut(limit)) => Err(InstallerError::BuildTimedOut {
            seconds: limit.as_secs(),
        }),
        TerminalStatus::Failed(cause) => Err(InstallerError::BuildFailed {
            cause: cause.to_string(),
            linker_available,
        }),
    }
}

/// Run `command` to completion, feeding its combined output to `monitor`.
///
/// Output is read until both streams reach end-of-file; nothing waits for a
/// particular line to appear. When `cancel` is set or `timeout` elapses the
/// child and every process it started are killed, and the build ends as
/// interrupted or timed out. A build cancelled before it starts is never
/// spawned.
///
/// # Errors
///
/// Returns [`InstallerError::BuildSpawn`] if the child cannot be started, or
/// an I/O error if its exit status cannot be collected. An unsuccessful build
/// is not an error here; it is reported in the returned [`BuildReport`].
pub fn stream_build(
    mut command: Command,
    mut monitor: BuildMonitor<'_>,
    cancel: &AtomicBool,
    timeout: Option<Duration>,
) -> Result<BuildReport> {
    if cancel.load(Ordering::SeqCst) {
        log::debug!("build cancelled before it started");
        return Ok(monitor.finish(ChildExit::Interrupted));
    }

    let rendered = render_command(&command);
    own_process_group(&mut command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| InstallerError::BuildSpawn {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;
    monitor.attach(&rendered);

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, tx.clone()));
    }
    drop(tx);

    let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
    let stopped = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                monitor.observe_line(&line);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break None,
        }

        if cancel.load(Ordering::SeqCst) {
            break Some(ChildExit::Interrupted);
        }
        if let Some((_, limit)) = deadline.filter(|&(at, _)| Instant::now() >= at) {
            break Some(ChildExit::TimedOut(limit));
        }
    };

    let exit = if let Some(reason) = stopped {
        log::debug!("stopping build: {reason}");
        terminate(&mut child);
        // Keep whatever was already read so the tail is as complete as possible.
        for line in rx.try_iter() {
            monitor.observe_line(&line);
        }
        reason
    } else {
        let status = child.wait()?;
        join_readers(readers);
        if cancel.load(Ordering::SeqCst) {
            ChildExit::Interrupted
        } else {
            ChildExit::from_status(status)
        }
    };

    Ok(monitor.finish(exit))
}

fn spawn_line_reader<R>(stream: R, lines: Sender<String>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_owned();
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("stopped reading build output: {e}");
                    break;
                }
            }
        }
    })
}

fn join_readers(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        if reader.join().is_err() {
            log::debug!("build output reader panicked");
        }
    }
}

/// Put the build in a process group of its own, so rustc and build scripts
/// can be killed along with cargo. The group also keeps a terminal Ctrl-C
/// from reaching cargo, leaving the stop to the cancel flag.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

fn terminate(child: &mut Child) {
    kill_group(child);
    if let Err(e) = child.kill() {
        log::debug!("failed to kill build process: {e}");
    }
    if let Err(e) = child.wait() {
        log::debug!("failed to reap build process: {e}");
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        log::debug!("build process id {} does not fit pid_t", child.id());
        return;
    };
    // SAFETY: kill has no memory-safety preconditions; the group was created
    // for this child by `own_process_group` and the child is not yet reaped.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        log::debug!(
            "failed to kill build process group: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Render a command for display, e.g. `cargo build --release`.
#[must_use]
pub fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests;
