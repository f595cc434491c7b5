//! Classification of build tool output lines.
//!
//! Cargo's human-readable output is not a stable interface, so everything
//! that depends on its phrasing lives behind [`LineClassifier`]. The monitor
//! only ever sees [`BuildEvent`] values.

use crate::error::Result;
use regex::{Captures, Regex};
use serde::Serialize;

/// A classified interpretation of one line of build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    /// The registry index is being updated or dependencies resolved.
    Resolving,
    /// A crate (or the crate list) is being downloaded.
    Downloading {
        /// The unit being fetched.
        unit: String,
    },
    /// A compilation unit has started compiling.
    CompilingUnit {
        /// Crate name without version.
        name: String,
    },
    /// The final binary is being linked.
    Linking,
    /// A test or binary is being run.
    TestRunning,
    /// The build tool reported completion.
    Finished,
    /// Anything else, including compiler diagnostics.
    Unclassified,
}

/// Maps a raw output line to exactly one [`BuildEvent`].
pub trait LineClassifier {
    /// Classify `line`. Implementations must be pure: the same line always
    /// yields the same event.
    fn classify(&self, line: &str) -> BuildEvent;
}

type EventBuilder = fn(&Captures<'_>) -> BuildEvent;

struct Rule {
    pattern: Regex,
    build: EventBuilder,
}

/// Classifier for cargo's default (human) message format.
///
/// Rules are tried in order and the first match wins, so a line is never
/// counted twice.
pub struct CargoLineClassifier {
    rules: Vec<Rule>,
}

fn capture(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default()
}

fn finished(_: &Captures<'_>) -> BuildEvent {
    BuildEvent::Finished
}

fn compiling_unit(caps: &Captures<'_>) -> BuildEvent {
    BuildEvent::CompilingUnit {
        name: capture(caps, 1),
    }
}

fn downloading(caps: &Captures<'_>) -> BuildEvent {
    BuildEvent::Downloading {
        unit: capture(caps, 1),
    }
}

fn resolving(_: &Captures<'_>) -> BuildEvent {
    BuildEvent::Resolving
}

fn linking(_: &Captures<'_>) -> BuildEvent {
    BuildEvent::Linking
}

fn test_running(_: &Captures<'_>) -> BuildEvent {
    BuildEvent::TestRunning
}

const RULES: &[(&str, EventBuilder)] = &[
    (r"^\s*Finished\b", finished),
    (r"^\s*Compiling\s+(\S+)", compiling_unit),
    (r"^\s*Download(?:ing|ed)\s+(\S+)", downloading),
    (r"^\s*(?:Updating|Locking|Resolving|Blocking)\b", resolving),
    (r"^\s*(?:Linking|Building)\b", linking),
    (r"^\s*Running\b", test_running),
];

impl CargoLineClassifier {
    /// Compile the classification rules.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule pattern fails to compile.
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|&(pattern, build)| {
                Ok(Rule {
                    pattern: Regex::new(pattern)?,
                    build,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl LineClassifier for CargoLineClassifier {
    fn classify(&self, line: &str) -> BuildEvent {
        self.rules
            .iter()
            .find_map(|rule| rule.pattern.captures(line).map(|caps| (rule.build)(&caps)))
            .unwrap_or(BuildEvent::Unclassified)
    }
}
