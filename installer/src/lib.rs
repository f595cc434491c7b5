//! OmniWordlist installer library.
//!
//! This crate builds the omni wordlist CLI from source and installs it. It is
//! used by the `omni-installer` binary and can be driven step by step for
//! testing or custom installation workflows.
//!
//! # Modules
//!
//! - [`builder`] - Release build driver and artifact check
//! - [`classify`] - Classification of cargo output lines into build events
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Resolved run configuration
//! - [`deps`] - External command execution abstraction
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Semantic error types with recovery hints
//! - [`git`] - Repository cloning and updating
//! - [`install`] - Installation strategies with privilege escalation
//! - [`interrupt`] - Ctrl-C handling
//! - [`monitor`] - Build progress state machine
//! - [`output`] - Shell snippets, remediation and dry-run text
//! - [`pipeline`] - Step orchestration and run summary
//! - [`progress`] - Human and JSON progress rendering
//! - [`source`] - Source tree acquisition
//! - [`toolchain`] - Rust toolchain detection and installation
//! - [`verify`] - Post-install `PATH` verification

pub mod builder;
pub mod classify;
pub mod cli;
pub mod config;
pub mod deps;
pub mod dirs;
pub mod error;
pub mod git;
pub mod install;
pub mod interrupt;
pub mod monitor;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod toolchain;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
