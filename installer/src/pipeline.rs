//! The verified-install pipeline.
//!
//! One invocation walks a fixed sequence of stages:
//!
//! ```text
//! Start -> Resolved -> Located -> Fetched -> Verified -> Installed -> Probed
//! ```
//!
//! Any stage before the probe may fail, which ends the run in
//! [`PipelineState::Failed`]. A failing probe only downgrades the outcome to
//! [`InstallOutcome::InstalledWithWarning`]; the installed binary stays.
//!
//! Cancellation and the overall deadline are checked before fetching,
//! between fetch and verify, and before install. Once the binary has been
//! renamed into place neither is consulted again.

use crate::artefact::download::{ArtefactDownloader, HttpDownloader};
use crate::artefact::verification::{fetch, verify};
use crate::error::{InstallError, Result};
use crate::install::{InstallTarget, InstalledBinary, install};
use crate::output::write_stderr_line;
use crate::platform::{Architecture, OsFamily, Platform, PlatformError, resolve_with_overrides};
use crate::probe::{ProbeError, ProbeRunner, SystemProbeRunner, probe_binary};
use crate::release::table::{ReleaseArtifact, ReleaseTable};
use log::{debug, error, info, warn};
use semver::Version;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default time budget for one installation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Platform detection.
    Resolve,
    /// Release table lookup.
    Locate,
    /// Archive download.
    Fetch,
    /// Digest comparison.
    Verify,
    /// Extraction and atomic placement.
    Install,
    /// Post-install smoke test.
    Probe,
}

impl Stage {
    /// Lowercase stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Locate => "locate",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Install => "install",
            Self::Probe => "probe",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the post-install probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The binary ran and printed the marker.
    Passed,
    /// The probe failed; the binary was kept.
    Warned,
    /// The probe was disabled.
    Skipped,
}

/// Where a pipeline run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has happened yet.
    Start,
    /// The platform is known.
    Resolved,
    /// An artifact was found for the platform.
    Located,
    /// The archive is in a temporary directory.
    Fetched,
    /// The archive digest matched.
    Verified,
    /// The binary is at its final path.
    Installed,
    /// The probe ran (or was skipped). Terminal.
    Probed(ProbeStatus),
    /// A stage failed. Terminal.
    Failed(Stage),
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal pipeline transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
    /// State the machine was in.
    pub from: PipelineState,
    /// State that was requested.
    pub to: PipelineState,
}

impl PipelineState {
    /// The stage that runs next from this state, if any.
    #[must_use]
    pub const fn next_stage(self) -> Option<Stage> {
        match self {
            Self::Start => Some(Stage::Resolve),
            Self::Resolved => Some(Stage::Locate),
            Self::Located => Some(Stage::Fetch),
            Self::Fetched => Some(Stage::Verify),
            Self::Verified => Some(Stage::Install),
            Self::Installed => Some(Stage::Probe),
            Self::Probed(_) | Self::Failed(_) => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Probed(_) | Self::Failed(_))
    }

    /// Move to `next`, rejecting anything but the single forward step or a
    /// failure of the stage that runs next.
    ///
    /// The probe stage cannot fail the pipeline; a failed probe is
    /// `Probed(Warned)`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] for any other move.
    ///
    /// # Examples
    ///
    /// ```
    /// use ga_installer::pipeline::{PipelineState, Stage};
    ///
    /// let state = PipelineState::Start.advance(PipelineState::Resolved).expect("legal");
    /// assert!(state.advance(PipelineState::Fetched).is_err());
    /// assert_eq!(
    ///     state.advance(PipelineState::Failed(Stage::Locate)),
    ///     Ok(PipelineState::Failed(Stage::Locate))
    /// );
    /// ```
    pub fn advance(self, next: Self) -> std::result::Result<Self, IllegalTransition> {
        let legal = match (self, next) {
            (Self::Start, Self::Resolved)
            | (Self::Resolved, Self::Located)
            | (Self::Located, Self::Fetched)
            | (Self::Fetched, Self::Verified)
            | (Self::Verified, Self::Installed)
            | (Self::Installed, Self::Probed(_)) => true,
            (from, Self::Failed(stage)) => {
                stage != Stage::Probe && from.next_stage() == Some(stage)
            }
            _ => false,
        };
        if legal {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Shared flag a caller sets to stop an installation early.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            info!("cancelled before {stage}");
            return Err(InstallError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Overall time budget for one run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Start the clock.
    #[must_use]
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// The configured limit.
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time left before the limit, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    fn check(&self, stage: Stage) -> Result<()> {
        if self.remaining().is_zero() {
            return Err(InstallError::Timeout {
                stage,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Which platform to install for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRequest {
    /// Host OS as reported by the runtime.
    pub host_os: String,
    /// Host architecture as reported by the runtime.
    pub host_arch: String,
    /// Explicit OS override.
    pub os: Option<OsFamily>,
    /// Explicit architecture override.
    pub arch: Option<Architecture>,
}

impl PlatformRequest {
    /// The running host, without overrides.
    #[must_use]
    pub fn host() -> Self {
        Self {
            host_os: std::env::consts::OS.to_owned(),
            host_arch: std::env::consts::ARCH.to_owned(),
            os: None,
            arch: None,
        }
    }

    /// Apply overrides on top of the detected host.
    #[must_use]
    pub fn with_overrides(mut self, os: Option<OsFamily>, arch: Option<Architecture>) -> Self {
        self.os = os;
        self.arch = arch;
        self
    }

    /// Resolve to a supported platform.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the host is unsupported and not fully
    /// overridden.
    pub fn resolve(&self) -> std::result::Result<Platform, PlatformError> {
        resolve_with_overrides(&self.host_os, &self.host_arch, self.os, self.arch)
    }
}

/// Everything one installation needs to know.
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    /// The loaded release table.
    pub table: &'a ReleaseTable,
    /// Requested version; the table's latest when absent.
    pub version: Option<&'a Version>,
    /// Platform selection.
    pub platform: PlatformRequest,
    /// Where the binary goes.
    pub target: InstallTarget,
    /// Overall time budget.
    pub timeout: Duration,
    /// Whether to run the post-install probe.
    pub probe: bool,
    /// When true, suppress progress output.
    pub quiet: bool,
}

/// A stage together with the error that stopped it.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// Why it failed.
    #[source]
    pub error: InstallError,
}

impl StageFailure {
    fn new(stage: Stage, error: impl Into<InstallError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// Caller-facing result of one installation.
#[derive(Debug)]
pub enum InstallOutcome {
    /// The binary is installed and the probe passed or was skipped.
    Installed {
        /// The installed binary.
        binary: InstalledBinary,
        /// The artifact it came from.
        artifact: ReleaseArtifact,
        /// Whether the probe ran.
        probe: ProbeStatus,
    },
    /// The binary is installed but failed its self-check.
    InstalledWithWarning {
        /// The installed binary.
        binary: InstalledBinary,
        /// The artifact it came from.
        artifact: ReleaseArtifact,
        /// Why the probe failed.
        warning: ProbeError,
    },
    /// The installation was aborted; nothing changed at the final path.
    Failed(StageFailure),
}

impl InstallOutcome {
    /// The terminal state this outcome corresponds to.
    #[must_use]
    pub fn final_state(&self) -> PipelineState {
        match self {
            Self::Installed { probe, .. } => PipelineState::Probed(*probe),
            Self::InstalledWithWarning { .. } => PipelineState::Probed(ProbeStatus::Warned),
            Self::Failed(failure) => PipelineState::Failed(failure.stage),
        }
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Installed { .. } | Self::InstalledWithWarning { .. } => 0,
            Self::Failed(failure) => failure.error.exit_code(),
        }
    }
}

/// Tracks the state of one run and logs each transition.
struct Progress<'w> {
    state: PipelineState,
    quiet: bool,
    stderr: &'w mut dyn Write,
}

impl<'w> Progress<'w> {
    fn new(quiet: bool, stderr: &'w mut dyn Write) -> Self {
        Self {
            state: PipelineState::Start,
            quiet,
            stderr,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        match self.state.advance(next) {
            Ok(state) => {
                debug!("pipeline: {:?} -> {state:?}", self.state);
                self.state = state;
            }
            Err(err) => error!("{err}"),
        }
    }

    fn say(&mut self, message: impl fmt::Display) {
        if !self.quiet {
            write_stderr_line(self.stderr, message);
        }
    }
}

/// Resolve the platform and locate the matching artifact without touching
/// the network or the filesystem.
///
/// # Errors
///
/// Returns a [`StageFailure`] for the resolve or locate stage.
pub fn locate_artifact(
    request: &InstallRequest<'_>,
) -> std::result::Result<ReleaseArtifact, StageFailure> {
    let platform = resolve_stage(request)?;
    locate_stage(request, platform)
}

fn resolve_stage(request: &InstallRequest<'_>) -> std::result::Result<Platform, StageFailure> {
    request
        .platform
        .resolve()
        .map_err(|e| StageFailure::new(Stage::Resolve, e))
}

fn locate_stage(
    request: &InstallRequest<'_>,
    platform: Platform,
) -> std::result::Result<ReleaseArtifact, StageFailure> {
    request
        .table
        .locate_requested(platform, request.version)
        .map_err(|e| StageFailure::new(Stage::Locate, e))
}

/// Run the pipeline with the production downloader and probe runner.
pub fn run_pipeline(
    request: &InstallRequest<'_>,
    cancellation: &Cancellation,
    stderr: &mut dyn Write,
) -> InstallOutcome {
    let downloader = HttpDownloader::new(request.timeout);
    run_pipeline_with(request, &downloader, &SystemProbeRunner, cancellation, stderr)
}

/// Testable inner function with injected dependencies.
///
/// The production entry point [`run_pipeline`] delegates here with real
/// implementations; tests inject stubs.
pub fn run_pipeline_with(
    request: &InstallRequest<'_>,
    downloader: &dyn ArtefactDownloader,
    probe_runner: &dyn ProbeRunner,
    cancellation: &Cancellation,
    stderr: &mut dyn Write,
) -> InstallOutcome {
    let deadline = Deadline::start(request.timeout);
    let mut progress = Progress::new(request.quiet, stderr);

    let (binary, artifact) =
        match install_stages(request, downloader, cancellation, &deadline, &mut progress) {
            Ok(installed) => installed,
            Err(failure) => {
                warn!("installation failed: {failure}");
                progress.enter(PipelineState::Failed(failure.stage));
                return InstallOutcome::Failed(failure);
            }
        };

    if !request.probe {
        progress.enter(PipelineState::Probed(ProbeStatus::Skipped));
        return InstallOutcome::Installed {
            binary,
            artifact,
            probe: ProbeStatus::Skipped,
        };
    }

    progress.say(format!("Checking {}...", binary.path));
    let probe = probe_binary(
        probe_runner,
        binary.path.as_std_path(),
        request.table.probe(),
        deadline.remaining(),
    );
    match probe {
        Ok(()) => {
            progress.enter(PipelineState::Probed(ProbeStatus::Passed));
            InstallOutcome::Installed {
                binary,
                artifact,
                probe: ProbeStatus::Passed,
            }
        }
        Err(warning) => {
            warn!("probe of {} failed: {warning}", binary.path);
            progress.enter(PipelineState::Probed(ProbeStatus::Warned));
            InstallOutcome::InstalledWithWarning {
                binary,
                artifact,
                warning,
            }
        }
    }
}

/// Resolve, locate, fetch, verify, and install.
fn install_stages(
    request: &InstallRequest<'_>,
    downloader: &dyn ArtefactDownloader,
    cancellation: &Cancellation,
    deadline: &Deadline,
    progress: &mut Progress<'_>,
) -> std::result::Result<(InstalledBinary, ReleaseArtifact), StageFailure> {
    let checkpoint = |stage: Stage| {
        cancellation
            .check(stage)
            .and_then(|()| deadline.check(stage))
            .map_err(|e| StageFailure::new(stage, e))
    };

    let platform = resolve_stage(request)?;
    progress.enter(PipelineState::Resolved);
    info!("resolved platform {platform}");

    let artifact = locate_stage(request, platform)?;
    progress.enter(PipelineState::Located);
    info!("located {artifact}");

    checkpoint(Stage::Fetch)?;
    progress.say(format!(
        "Downloading {} {} for {}...",
        request.table.package().name,
        artifact.version,
        artifact.platform
    ));
    let fetched = fetch(downloader, &artifact).map_err(|e| {
        StageFailure::new(Stage::Fetch, InstallError::from_fetch(e, deadline.limit()))
    })?;
    progress.enter(PipelineState::Fetched);

    checkpoint(Stage::Verify)?;
    let verified = verify(fetched, &artifact).map_err(|e| {
        StageFailure::new(Stage::Verify, InstallError::from_fetch(e, deadline.limit()))
    })?;
    progress.enter(PipelineState::Verified);
    progress.say(format!("Verified SHA-256 {}", verified.digest()));

    checkpoint(Stage::Install)?;
    let binary = install(&verified, &request.target)
        .map_err(|e| StageFailure::new(Stage::Install, e))?;
    progress.enter(PipelineState::Installed);

    Ok((binary, artifact))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
