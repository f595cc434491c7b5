//! Shared test utilities for the installer crate.

use crate::deps::CommandExecutor;
use crate::error::{InstallerError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "cargo").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<&'static str>,
    /// Whether the call is expected through `run_interactive`.
    pub interactive: bool,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expects a captured-output invocation.
    #[must_use]
    pub fn new(cmd: &'static str, args: &[&'static str], result: Result<Output>) -> Self {
        Self {
            cmd,
            args: args.to_vec(),
            interactive: false,
            result,
        }
    }

    /// Expects an interactive invocation.
    #[must_use]
    pub fn interactive(cmd: &'static str, args: &[&'static str], result: Result<Output>) -> Self {
        Self {
            interactive: true,
            ..Self::new(cmd, args, result)
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
/// Arguments that contain a path under a temporary directory can be matched
/// with the `"*"` wildcard.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    path: Option<OsString>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            path: None,
        }
    }

    /// Sets the search path reported by the stub.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<OsString>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remaining: {:?}",
            remaining.len(),
            remaining.front().map(|call| call.cmd)
        );
    }

    fn next_call(&self, cmd: &str, args: &[&str], interactive: bool) -> Result<Output> {
        let call = self.expected.borrow_mut().pop_front().ok_or_else(|| {
            InstallerError::StubMismatch {
                message: format!("unexpected command invocation: {cmd} {args:?}"),
            }
        })?;

        let args_match = call.args.len() == args.len()
            && call
                .args
                .iter()
                .zip(args)
                .all(|(expected, actual)| *expected == "*" || expected == actual);

        if call.cmd != cmd || !args_match || call.interactive != interactive {
            return Err(InstallerError::StubMismatch {
                message: format!(
                    "expected {} {:?} (interactive: {}), got {cmd} {args:?} (interactive: {interactive})",
                    call.cmd, call.args, call.interactive
                ),
            });
        }

        call.result
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        self.next_call(cmd, args, false)
    }

    fn run_interactive(&self, cmd: &str, args: &[&str]) -> Result<ExitStatus> {
        self.next_call(cmd, args, true).map(|output| output.status)
    }

    fn search_path(&self) -> Option<OsString> {
        self.path.clone()
    }
}
