//! Install pipeline orchestration.
//!
//! [`Pipeline`] runs the five steps in order: toolchain, source, build,
//! install and verify. Each step reports through the [`ProgressSink`] and
//! takes its collaborators as parameters, so tests can drive a single step
//! with stubs. [`run_install`] wires the steps to the real system.
//!
//! Only toolchain, source-acquisition and build problems stop the run. A
//! failed refresh, an install that needs manual action and an unconfirmed
//! `PATH` lookup are carried to the end and listed in the [`RunSummary`].
//!
//! An interrupt also stops the run. The flag is checked before every step,
//! and a step that failed after the flag was set reports
//! [`InstallerError::Interrupted`] rather than its own error.

use crate::builder::{BuildConfig, Builder};
use crate::classify::CargoLineClassifier;
use crate::cli::ProgressFormat;
use crate::config::{InstallerConfig, SourceLocation};
use crate::deps::{CommandExecutor, SystemCommandExecutor};
use crate::error::{InstallerError, Result};
use crate::git::{GitOps, SystemGit};
use crate::install::{InstallOutcome, InstallationTarget, PrivilegedInstaller};
use crate::monitor::BuildMonitor;
use crate::output::{manual_install_text, success_message, unconfirmed_text};
use crate::progress::{Notice, ProgressSink, Step};
use crate::source::{SourceSync, SyncOutcome, SyncedSource};
use crate::toolchain::{PinStatus, PinnedToolchain, PrerequisiteChecker, ToolchainInfo};
use crate::verify::{Unconfirmed, VerificationResult, Verifier};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static NEVER_CANCELLED: AtomicBool = AtomicBool::new(false);

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// How the source tree was obtained.
    pub source: SyncOutcome,
    /// The built binary.
    pub artifact: Utf8PathBuf,
    /// Result of the install step.
    pub install: InstallOutcome,
    /// Result of the verify step.
    pub verification: VerificationResult,
}

impl RunSummary {
    /// Outcomes that completed in a degraded way, in step order.
    #[must_use]
    pub fn degraded(&self) -> Vec<String> {
        let mut degraded = Vec::new();
        if let SyncOutcome::Stale { reason } = &self.source {
            degraded.push(format!("source was not refreshed ({reason})"));
        }
        if let InstallOutcome::Degraded { destination, .. } = &self.install {
            degraded.push(format!("binary was not installed to {destination}"));
        }
        if let VerificationResult::Unconfirmed { reason, .. } = &self.verification {
            let detail = match reason {
                Unconfirmed::NotOnPath => "its directory is not on PATH",
                Unconfirmed::Shadowed { .. } => "another copy shadows it on PATH",
                Unconfirmed::NotFound => "it is not at the install path",
            };
            degraded.push(format!("command could not be confirmed: {detail}"));
        }
        degraded
    }

    /// Returns true when no outcome was degraded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degraded().is_empty()
    }
}

/// Runs the install steps against a resolved configuration.
pub struct Pipeline<'a> {
    config: &'a InstallerConfig,
    sink: &'a mut dyn ProgressSink,
    cancel: &'a AtomicBool,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline reporting to `sink`.
    pub fn new(config: &'a InstallerConfig, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            config,
            sink,
            cancel: &NEVER_CANCELLED,
        }
    }

    /// Stop at the next step boundary once `cancel` is set.
    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail with [`InstallerError::Interrupted`] once the run was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Interrupted`] when the cancel flag is set.
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            log::info!("run interrupted");
            return Err(InstallerError::Interrupted);
        }
        Ok(())
    }

    /// Ensure cargo is available, installing a toolchain when needed.
    ///
    /// With `skip_toolchain` set, cargo is assumed to be on the executor's
    /// `PATH` and nothing is probed.
    ///
    /// # Errors
    ///
    /// Propagates toolchain installation failures.
    pub fn ensure_toolchain(&mut self, executor: &dyn CommandExecutor) -> Result<ToolchainInfo> {
        self.started(Step::Toolchain)?;
        if self.config.skip_toolchain {
            self.done(Step::Toolchain, "toolchain check skipped");
            return Ok(ToolchainInfo::assumed(executor.search_path()));
        }

        let checker = PrerequisiteChecker::new(executor, self.config.cargo_bin_dir.clone())
            .with_installer_output_on_stderr(self.config.progress_format == ProgressFormat::Json);
        let info = self.settle(checker.ensure_toolchain())?;
        if !info.linker_available() {
            self.warn("no C linker (cc) found; the build may fail to link");
        }
        let mut detail = if info.installed_now() {
            format!("installed {}", info.cargo_version())
        } else {
            info.cargo_version().to_owned()
        };
        if let Some(rustc) = info.rustc_version() {
            detail.push_str(", ");
            detail.push_str(rustc);
        }
        self.done(Step::Toolchain, detail);
        Ok(info)
    }

    /// Obtain the source tree to build.
    ///
    /// # Errors
    ///
    /// Fails when no usable tree exists: the initial clone failed or the
    /// source directory holds something else.
    pub fn sync_source(&mut self, git: &dyn GitOps) -> Result<SyncedSource> {
        self.started(Step::Source)?;
        let synced = match &self.config.source {
            SourceLocation::InTree(path) => SyncedSource {
                path: path.clone(),
                outcome: SyncOutcome::InTree,
            },
            SourceLocation::Managed(path) => self.settle(
                SourceSync::new(git, self.config.update).sync_source(&self.config.repo_url, path),
            )?,
        };
        self.ensure_not_cancelled()?;

        let path = &synced.path;
        let detail = match &synced.outcome {
            SyncOutcome::InTree => format!("using the checkout at {path}"),
            SyncOutcome::Cloned => format!("cloned into {path}"),
            SyncOutcome::Updated => format!("updated {path}"),
            SyncOutcome::Reused => format!("using existing checkout at {path}"),
            SyncOutcome::Stale { reason } => {
                self.warn(format!(
                    "could not refresh the source, building the existing checkout: {reason}"
                ));
                format!("using possibly stale checkout at {path}")
            }
        };
        self.done(Step::Source, detail);
        Ok(synced)
    }

    /// Install the toolchain pinned by the source tree, if any.
    ///
    /// # Errors
    ///
    /// Fails when the pin file is unreadable or rustup cannot install it.
    pub fn honour_pin(&mut self, source: &Utf8Path, executor: &dyn CommandExecutor) -> Result<()> {
        self.ensure_not_cancelled()?;
        if self.config.skip_toolchain {
            return Ok(());
        }
        let Some(pin) = PinnedToolchain::detect(source)? else {
            return Ok(());
        };

        match self.settle(pin.ensure_installed(executor))? {
            PinStatus::AlreadyInstalled => {
                log::debug!("pinned toolchain {} already installed", pin.channel());
            }
            PinStatus::Installed => self.done(
                Step::Toolchain,
                format!("installed pinned toolchain {}", pin.channel()),
            ),
            PinStatus::RustupUnavailable => self.warn(format!(
                "the source pins toolchain {} but rustup is unavailable; using the default toolchain",
                pin.channel()
            )),
        }
        Ok(())
    }

    /// Run the release build, streaming progress.
    ///
    /// # Errors
    ///
    /// Fails when the build fails, is interrupted, times out or produces no
    /// binary.
    pub fn build(&mut self, toolchain: &ToolchainInfo, source: &Utf8Path) -> Result<Utf8PathBuf> {
        self.started(Step::Build)?;
        let classifier = CargoLineClassifier::new()?;
        let builder = Builder::new(BuildConfig {
            cargo: toolchain.cargo().to_owned(),
            source_dir: source.to_owned(),
            binary_name: self.config.binary_name.clone(),
            jobs: self.config.jobs,
            timeout: self.config.build_timeout,
            search_path: toolchain.search_path().cloned(),
        });

        let monitor = BuildMonitor::new(&classifier, &mut *self.sink, self.config.monitor);
        let artifact = builder.build(monitor, self.cancel, toolchain.linker_available())?;
        self.done(Step::Build, format!("built {artifact}"));
        Ok(artifact)
    }

    /// Install the artifact, degrading to manual instructions if needed.
    ///
    /// # Errors
    ///
    /// Fails when the artifact itself is missing, or when the run is
    /// interrupted before or during the install. An interrupted install
    /// leaves the destination untouched unless a strategy had already
    /// succeeded.
    pub fn install(
        &mut self,
        artifact: &Utf8Path,
        executor: &dyn CommandExecutor,
    ) -> Result<InstallOutcome> {
        self.started(Step::Install)?;
        let target = InstallationTarget::probe(
            &self.config.install_dir,
            &self.config.binary_name,
            self.config.elevation,
        );
        log::debug!(
            "installing to {} via {} (fallbacks: {:?})",
            target.destination(),
            target.chosen(),
            target.strategies()
        );

        let outcome = PrivilegedInstaller::new(executor).install(artifact, &target)?;
        match &outcome {
            InstallOutcome::Installed { path, strategy } => self.done(
                Step::Install,
                format!("{} ({strategy})", success_message(&self.config.binary_name, path)),
            ),
            InstallOutcome::Degraded {
                artifact,
                destination,
                reasons,
            } => {
                for reason in reasons {
                    log::info!("install attempt failed: {reason}");
                }
                // Ctrl-C at a sudo prompt fails the attempt; it is not a
                // reason to fall back to manual steps.
                self.ensure_not_cancelled()?;
                self.warn(manual_install_text(artifact, destination));
            }
        }
        Ok(outcome)
    }

    /// Check that the installed command resolves on `PATH`.
    ///
    /// # Errors
    ///
    /// Only fails when the run was interrupted before this step.
    pub fn verify(
        &mut self,
        verifier: &Verifier,
        expected: &Utf8Path,
    ) -> Result<VerificationResult> {
        self.started(Step::Verify)?;
        let result = verifier.verify(&self.config.binary_name, expected);
        match &result {
            VerificationResult::Confirmed { path } => self.done(
                Step::Verify,
                format!("{} resolves to {}", self.config.binary_name, path.display()),
            ),
            VerificationResult::Unconfirmed { reason, expected } => {
                self.warn(unconfirmed_text(reason, expected));
            }
        }
        Ok(result)
    }

    /// Report the end of the run.
    pub fn finish(&mut self, summary: &RunSummary) {
        self.sink.notice(&Notice::RunFinished {
            binary: self.config.binary_name.clone(),
            degraded: summary.degraded(),
        });
    }

    fn started(&mut self, step: Step) -> Result<()> {
        self.ensure_not_cancelled()?;
        log::debug!("starting step {step:?}");
        self.sink.notice(&Notice::StepStarted { step });
        Ok(())
    }

    /// A child killed by the same Ctrl-C fails with its own error; report
    /// the interrupt instead.
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if self.cancel.load(Ordering::SeqCst) => {
                log::debug!("step failed after interrupt: {e}");
                Err(InstallerError::Interrupted)
            }
            other => other,
        }
    }

    fn done(&mut self, step: Step, detail: impl Into<String>) {
        self.sink.notice(&Notice::StepDone {
            step,
            detail: detail.into(),
        });
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.sink.notice(&Notice::Warning { message });
    }
}

/// Run every step against the real system.
///
/// `cancel` is checked between steps and polled during the build; setting
/// it ends the run with [`InstallerError::Interrupted`].
///
/// # Errors
///
/// Returns the first fatal step failure.
pub fn run_install(
    config: &InstallerConfig,
    sink: &mut dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let mut pipeline = Pipeline::new(config, sink).with_cancel(cancel);

    let toolchain = pipeline.ensure_toolchain(&SystemCommandExecutor::default())?;
    let executor = toolchain
        .search_path()
        .cloned()
        .map_or_else(SystemCommandExecutor::default, SystemCommandExecutor::with_path);

    let synced = pipeline.sync_source(&SystemGit::new(toolchain.search_path().cloned()))?;
    pipeline.honour_pin(&synced.path, &executor)?;
    let artifact = pipeline.build(&toolchain, &synced.path)?;
    let install = pipeline.install(&artifact, &executor)?;

    // The user's own PATH, not the re-sourced one: the question is whether a
    // new command in this shell finds the binary.
    let verifier = Verifier::new(std::env::var_os("PATH"), std::env::current_dir()?);
    let expected = match &install {
        InstallOutcome::Installed { path, .. } => path.clone(),
        InstallOutcome::Degraded { destination, .. } => destination.clone(),
    };
    let verification = pipeline.verify(&verifier, &expected)?;

    let summary = RunSummary {
        source: synced.outcome,
        artifact,
        install,
        verification,
    };
    pipeline.finish(&summary);
    Ok(summary)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
