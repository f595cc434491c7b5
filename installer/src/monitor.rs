//! Build monitoring state machine.
//!
//! A [`BuildMonitor`] owns all progress state for one build invocation. It is
//! fed raw output lines as they arrive and the child's exit once the stream
//! ends; it never looks at the process itself. States move strictly forward:
//!
//! ```text
//! Starting -> Streaming -> Succeeded | Failed
//! ```
//!
//! The exit status alone decides the terminal state. Log text is advisory: a
//! build that prints nothing recognisable but exits zero has succeeded, and a
//! build that prints `Finished` but exits non-zero has failed.

use crate::classify::{BuildEvent, LineClassifier};
use crate::progress::{Notice, Phase, ProgressSink};
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

/// Default number of compiled units between periodic summaries.
pub const DEFAULT_SUMMARY_EVERY: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(every) => every,
    None => NonZeroUsize::MIN,
};

/// Default number of raw lines kept for failure diagnostics.
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Lifecycle state of a monitored build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Created; the child is not yet attached.
    Starting,
    /// The child's output is being consumed.
    Streaming,
    /// The child exited with status zero.
    Succeeded,
    /// The child exited unsuccessfully, was killed, or was interrupted.
    Failed,
}

/// How the build child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// The process exited with a code.
    Code(i32),
    /// The process was terminated by a signal.
    Signalled(i32),
    /// The user interrupted the build.
    Interrupted,
    /// The build exceeded its time limit and was killed.
    TimedOut(Duration),
}

impl ChildExit {
    /// Convert an OS exit status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signalled(signal);
            }
        }
        Self::Code(-1)
    }

    /// Returns true only for a zero exit code.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Code(0)
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signalled(signal) => write!(f, "killed by signal {signal}"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Final outcome of a build, fixed once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The build succeeded.
    Succeeded,
    /// The build failed for the given reason.
    Failed(ChildExit),
}

/// Counters and timers for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    start_time: Instant,
    compiled_count: usize,
    last_summary_count: usize,
    terminal_status: Option<TerminalStatus>,
}

impl ProgressState {
    fn new(start_time: Instant) -> Self {
        Self {
            start_time,
            compiled_count: 0,
            last_summary_count: 0,
            terminal_status: None,
        }
    }

    /// Number of `Compiling` lines seen so far. Never decreases.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled_count
    }

    /// Compiled count at which the last periodic summary was emitted.
    #[must_use]
    pub fn last_summary_count(&self) -> usize {
        self.last_summary_count
    }

    /// Time since the build was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Terminal status, once the build has ended.
    #[must_use]
    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        self.terminal_status
    }

    fn conclude(&mut self, status: TerminalStatus) -> TerminalStatus {
        *self.terminal_status.get_or_insert(status)
    }
}

/// Tunables for a [`BuildMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Emit a summary each time this many more units have compiled.
    pub summary_every: NonZeroUsize,
    /// Number of raw output lines retained for failure diagnostics.
    pub tail_lines: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            summary_every: DEFAULT_SUMMARY_EVERY,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// Result of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Final counters, with the terminal status set.
    pub progress: ProgressState,
    /// Most recent raw output lines, oldest first.
    pub tail: Vec<String>,
    /// Whether the build tool printed its `Finished` line.
    pub saw_finished: bool,
}

impl BuildReport {
    /// The terminal status of the build.
    #[must_use]
    pub fn status(&self) -> TerminalStatus {
        self.progress
            .terminal_status()
            .unwrap_or(TerminalStatus::Failed(ChildExit::Code(-1)))
    }

    /// Returns true if the build succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status() == TerminalStatus::Succeeded
    }

    /// The state the monitor ended in.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        if self.succeeded() {
            MonitorState::Succeeded
        } else {
            MonitorState::Failed
        }
    }
}

/// Consumes build output and tracks progress for one build.
pub struct BuildMonitor<'a> {
    classifier: &'a dyn LineClassifier,
    sink: &'a mut dyn ProgressSink,
    settings: MonitorSettings,
    state: MonitorState,
    progress: ProgressState,
    tail: VecDeque<String>,
    phases_seen: Vec<Phase>,
    saw_finished: bool,
}

impl<'a> BuildMonitor<'a> {
    /// Create a monitor in the `Starting` state.
    pub fn new(
        classifier: &'a dyn LineClassifier,
        sink: &'a mut dyn ProgressSink,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            classifier,
            sink,
            settings,
            state: MonitorState::Starting,
            progress: ProgressState::new(Instant::now()),
            tail: VecDeque::with_capacity(settings.tail_lines),
            phases_seen: Vec::new(),
            saw_finished: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Current counters.
    #[must_use]
    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    /// Mark the child as spawned and its output attached.
    pub fn attach(&mut self, command: &str) {
        if self.state != MonitorState::Starting {
            return;
        }
        self.state = MonitorState::Streaming;
        self.progress.start_time = Instant::now();
        self.sink.notice(&Notice::BuildStarted {
            command: command.to_owned(),
        });
    }

    /// Classify one raw line and update progress.
    ///
    /// Lines observed before [`BuildMonitor::attach`] implicitly attach the
    /// monitor.
    pub fn observe_line(&mut self, line: &str) -> BuildEvent {
        if self.state == MonitorState::Starting {
            self.state = MonitorState::Streaming;
        }

        self.remember(line);
        let event = self.classifier.classify(line);
        match &event {
            BuildEvent::CompilingUnit { name } => self.record_compiled(name),
            BuildEvent::Resolving => self.enter_phase(Phase::Resolving),
            BuildEvent::Downloading { .. } => self.enter_phase(Phase::Downloading),
            BuildEvent::Linking => self.enter_phase(Phase::Linking),
            BuildEvent::Finished => self.saw_finished = true,
            BuildEvent::TestRunning | BuildEvent::Unclassified => {}
        }
        event
    }

    /// End the build with the child's exit and report the outcome.
    ///
    /// Consuming the monitor makes the terminal status final.
    #[must_use]
    pub fn finish(self, exit: ChildExit) -> BuildReport {
        let Self {
            sink,
            mut progress,
            tail,
            saw_finished,
            ..
        } = self;
        let status = if exit.is_success() {
            TerminalStatus::Succeeded
        } else {
            TerminalStatus::Failed(exit)
        };
        let status = progress.conclude(status);
        let compiled = progress.compiled_count;
        let elapsed_secs = progress.elapsed().as_secs();
        let tail: Vec<String> = tail.into_iter().collect();

        match status {
            TerminalStatus::Succeeded => {
                sink.notice(&Notice::BuildSucceeded {
                    compiled,
                    elapsed_secs,
                });
            }
            TerminalStatus::Failed(cause) => {
                log::debug!("build failed: {cause}");
                sink.notice(&Notice::BuildFailed {
                    cause: cause.to_string(),
                    compiled,
                    elapsed_secs,
                    tail: tail.clone(),
                });
            }
        }

        BuildReport {
            progress,
            tail,
            saw_finished,
        }
    }

    fn remember(&mut self, line: &str) {
        if self.settings.tail_lines == 0 {
            return;
        }
        if self.tail.len() == self.settings.tail_lines {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_owned());
    }

    fn record_compiled(&mut self, name: &str) {
        self.progress.compiled_count += 1;
        let count = self.progress.compiled_count;
        self.sink.notice(&Notice::Compiling {
            name: name.to_owned(),
            count,
        });

        if count - self.progress.last_summary_count >= self.settings.summary_every.get() {
            self.progress.last_summary_count = count;
            self.sink.notice(&Notice::Summary {
                compiled: count,
                elapsed_secs: self.progress.elapsed().as_secs(),
            });
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        if self.phases_seen.contains(&phase) {
            return;
        }
        self.phases_seen.push(phase);
        self.sink.notice(&Notice::Phase { phase });
    }
}
