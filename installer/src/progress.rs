//! Progress reporting for the install pipeline.
//!
//! Everything the user sees while the installer runs is a [`Notice`]. A
//! [`ProgressSink`] decides how notices are rendered: [`HumanSink`] writes
//! colour-coded lines for a terminal and [`JsonSink`] writes one JSON object
//! per line for CI logs. Sinks write to any `Write`, so tests can capture
//! output in a `Vec<u8>`.

use colored::Colorize;
use serde::Serialize;
use std::io::Write;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Toolchain probe and install.
    Toolchain,
    /// Clone or refresh of the source tree.
    Source,
    /// Release build.
    Build,
    /// Copy into the install directory.
    Install,
    /// Reachability check of the installed command.
    Verify,
}

impl Step {
    fn title(self) -> &'static str {
        match self {
            Self::Toolchain => "Checking Rust toolchain",
            Self::Source => "Syncing source",
            Self::Build => "Building release binary",
            Self::Install => "Installing",
            Self::Verify => "Verifying installation",
        }
    }
}

/// Coarse build phases reported once each, the first time they are seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Dependency resolution or index update.
    Resolving,
    /// Crate downloads.
    Downloading,
    /// Final link.
    Linking,
}

/// A single user-facing progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A pipeline step has started.
    StepStarted {
        /// The step.
        step: Step,
    },
    /// A pipeline step completed.
    StepDone {
        /// The step.
        step: Step,
        /// One-line description of the result.
        detail: String,
    },
    /// A non-fatal problem the user should know about.
    Warning {
        /// The warning text.
        message: String,
    },
    /// The build process was spawned.
    BuildStarted {
        /// Rendered build command.
        command: String,
    },
    /// A build phase was entered.
    Phase {
        /// The phase.
        phase: Phase,
    },
    /// A compilation unit started compiling.
    Compiling {
        /// Crate name.
        name: String,
        /// Running count of compiled units, including this one.
        count: usize,
    },
    /// Periodic progress summary.
    Summary {
        /// Units compiled so far.
        compiled: usize,
        /// Seconds since the build started.
        elapsed_secs: u64,
    },
    /// The build finished with a zero exit status.
    BuildSucceeded {
        /// Units compiled in total.
        compiled: usize,
        /// Build duration in seconds.
        elapsed_secs: u64,
    },
    /// The build did not succeed.
    BuildFailed {
        /// Why the build failed.
        cause: String,
        /// Units compiled before the failure.
        compiled: usize,
        /// Seconds until the failure.
        elapsed_secs: u64,
        /// Most recent raw output lines.
        tail: Vec<String>,
    },
    /// Every step ran; `degraded` lists outcomes that need attention.
    RunFinished {
        /// Name of the installed command.
        binary: String,
        /// Degraded outcomes, empty for a clean run.
        degraded: Vec<String>,
    },
}

/// Destination for progress notices.
pub trait ProgressSink {
    /// Report a notice. Rendering failures are not fatal to the run.
    fn notice(&mut self, notice: &Notice);
}

/// Formats seconds as `1m 05s` or `12s`.
fn format_secs(secs: u64) -> String {
    let (minutes, seconds) = (secs / 60, secs % 60);
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

/// Renders notices as colour-coded lines for a human reader.
pub struct HumanSink<W: Write> {
    out: W,
    quiet: bool,
}

impl<W: Write> HumanSink<W> {
    /// Create a sink. When `quiet` is set, phase changes are suppressed.
    /// Every compiled unit is still printed as it is reported.
    pub fn new(out: W, quiet: bool) -> Self {
        Self { out, quiet }
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        if let Err(e) = writeln!(self.out, "{text}") {
            log::debug!("failed to write progress: {e}");
        }
    }

    fn render(&mut self, notice: &Notice) {
        match notice {
            Notice::StepStarted { step } => {
                self.line(format!("==> {}", step.title()).bold().blue());
            }
            Notice::StepDone { detail, .. } => self.line(format!("  ✓ {detail}").green()),
            Notice::Warning { message } => self.line(format!("  ! {message}").yellow()),
            Notice::BuildStarted { command } => self.line(format!("  $ {command}").dimmed()),
            Notice::Phase { phase } if !self.quiet => {
                let label = match phase {
                    Phase::Resolving => "resolving dependencies",
                    Phase::Downloading => "downloading crates",
                    Phase::Linking => "linking",
                };
                self.line(format!("  .. {label}").dimmed());
            }
            Notice::Phase { .. } => {}
            Notice::Compiling { name, count } => {
                self.line(format!("  [{count:>4}] compiling {name}"));
            }
            Notice::Summary {
                compiled,
                elapsed_secs,
            } => self.line(
                format!(
                    "  -- {compiled} units compiled, {} elapsed",
                    format_secs(*elapsed_secs)
                )
                .cyan(),
            ),
            Notice::BuildSucceeded {
                compiled,
                elapsed_secs,
            } => self.line(
                format!(
                    "  ✓ build finished: {compiled} units compiled in {}",
                    format_secs(*elapsed_secs)
                )
                .green(),
            ),
            Notice::BuildFailed {
                cause,
                compiled,
                elapsed_secs,
                tail,
            } => {
                self.line(
                    format!(
                        "  ✗ build failed ({cause}) after {compiled} units, {}",
                        format_secs(*elapsed_secs)
                    )
                    .red()
                    .bold(),
                );
                if !tail.is_empty() {
                    self.line(format!("--- last {} lines of build output ---", tail.len()).dimmed());
                    for raw in tail {
                        self.line(raw);
                    }
                    self.line("--- end of build output ---".dimmed());
                }
            }
            Notice::RunFinished { binary, degraded } if degraded.is_empty() => {
                self.line(format!("==> {binary} is ready").bold().green());
            }
            Notice::RunFinished { binary, degraded } => {
                self.line(
                    format!("==> {binary} finished with {} warning(s):", degraded.len())
                        .bold()
                        .yellow(),
                );
                for item in degraded {
                    self.line(format!("  - {item}"));
                }
            }
        }
    }
}

impl<W: Write> ProgressSink for HumanSink<W> {
    fn notice(&mut self, notice: &Notice) {
        self.render(notice);
    }
}

/// Writes each notice as a single-line JSON object.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    /// Create a sink writing JSON lines to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for JsonSink<W> {
    fn notice(&mut self, notice: &Notice) {
        let written = serde_json::to_writer(&mut self.out, notice)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(e) = written {
            log::debug!("failed to write progress: {e}");
        }
    }
}

/// Collects notices in memory.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Notices in the order they were reported.
    pub notices: Vec<Notice>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    /// Compiled counts at which periodic summaries were reported.
    #[must_use]
    pub fn summary_counts(&self) -> Vec<usize> {
        self.notices
            .iter()
            .filter_map(|notice| match notice {
                Notice::Summary { compiled, .. } => Some(*compiled),
                _ => None,
            })
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProgressSink for RecordingSink {
    fn notice(&mut self, notice: &Notice) {
        self.notices.push(notice.clone());
    }
}
