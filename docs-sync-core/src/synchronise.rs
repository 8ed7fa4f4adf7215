//! High-level pipeline: orchestrates detect → build → stage → publish.
//!
//! One call of [`synchronise`] is one run. It
//!   - asks a [`ChangeDetector`] which integrations changed between two commits
//!   - exits early (state `Done`) when nothing under the integrations root changed
//!   - builds the docs of every changed integration through a [`BuildRunner`]
//!   - copies the generated pages into a fresh [`StagingArea`]
//!   - syncs the staged pages to a [`DocsHost`] under the configured version
//!
//! # Error Handling
//! Every failed step moves the run to `Failed` and returns the error; there is
//! no retry. With [`FailurePolicy::Continue`] successful integrations are
//! still published before the run fails with [`SyncError::BuildFailures`].
//!
//! # Cancellation
//! The returned future owns every build (its whole process group is killed
//! on drop) and the staging directory (removed on drop); dropping it aborts
//! the run.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::build::{build_all, BuildOptions};
use crate::config::{FailurePolicy, SyncConfig};
use crate::contract::{BuildResult, BuildRunner, ChangeDetector, DocsHost};
use crate::detect::ChangeSet;
use crate::error::SyncError;
use crate::publish::{publish_staging, PublishRecord};
use crate::stage::{ArtifactPattern, StagedArtifact, StagingArea};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Detecting,
    Building,
    Staging,
    Publishing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Detecting)
            | (Detecting, Done)
            | (Detecting, Building)
            | (Building, Staging)
            | (Staging, Publishing)
            | (Publishing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug)]
struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) -> Result<(), SyncError> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(from = ?self.state, to = ?next, "[SYNC] State transition");
        self.state = next;
        Ok(())
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub base: String,
    pub head: String,
    pub changes: ChangeSet,
    pub builds: Vec<BuildResult>,
    /// Changed integrations whose directory no longer exists.
    pub skipped: Vec<String>,
    pub staged: Vec<StagedArtifact>,
    pub published: Vec<PublishRecord>,
    pub state: RunState,
    /// Why the run failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    fn new(base: &str, head: &str) -> Self {
        Self {
            base: base.to_string(),
            head: head.to_string(),
            changes: ChangeSet::default(),
            builds: Vec::new(),
            skipped: Vec::new(),
            staged: Vec::new(),
            published: Vec::new(),
            state: RunState::Idle,
            error: None,
        }
    }
}

/// Run the whole pipeline for the commit pair `base..head`.
pub async fn synchronise<D, R, H>(
    config: &SyncConfig,
    base: &str,
    head: &str,
    detector: &D,
    runner: &R,
    host: &H,
) -> Result<SyncReport, SyncError>
where
    D: ChangeDetector + ?Sized,
    R: BuildRunner + ?Sized,
    H: DocsHost + ?Sized,
{
    let (report, result) = synchronise_report(config, base, head, detector, runner, host).await;
    result.map(|()| report)
}

/// Like [`synchronise`], but the report is returned on failure too: it holds
/// everything done up to the failing step, with state `Failed`.
pub async fn synchronise_report<D, R, H>(
    config: &SyncConfig,
    base: &str,
    head: &str,
    detector: &D,
    runner: &R,
    host: &H,
) -> (SyncReport, Result<(), SyncError>)
where
    D: ChangeDetector + ?Sized,
    R: BuildRunner + ?Sized,
    H: DocsHost + ?Sized,
{
    info!(base, head, "[SYNC] Starting docs synchronisation");
    let mut tracker = RunTracker::new();
    let mut report = SyncReport::new(base, head);
    let result = run_pipeline(&mut tracker, &mut report, config, detector, runner, host).await;
    match &result {
        Ok(()) => info!(
            changed = report.changes.len(),
            staged = report.staged.len(),
            published = report.published.len(),
            "[SYNC] Synchronisation complete"
        ),
        Err(e) => {
            if !tracker.state.is_terminal() {
                if let Err(transition) = tracker.advance(RunState::Failed) {
                    warn!(error = %transition, "[SYNC] Could not mark run as failed");
                }
            }
            error!(error = %e, "[SYNC][ERROR] Synchronisation failed");
            report.error = Some(e.to_string());
        }
    }
    report.state = tracker.state;
    (report, result)
}

async fn run_pipeline<D, R, H>(
    tracker: &mut RunTracker,
    report: &mut SyncReport,
    config: &SyncConfig,
    detector: &D,
    runner: &R,
    host: &H,
) -> Result<(), SyncError>
where
    D: ChangeDetector + ?Sized,
    R: BuildRunner + ?Sized,
    H: DocsHost + ?Sized,
{
    let pattern = ArtifactPattern::new(&config.artifacts.pattern)?;

    // Step 1: detect
    tracker.advance(RunState::Detecting)?;
    report.changes = detector.detect(&report.base, &report.head).await?;
    if report.changes.is_empty() {
        info!("[SYNC] No integration changed, nothing to build or publish");
        tracker.advance(RunState::Done)?;
        return Ok(());
    }

    // Step 2: build
    tracker.advance(RunState::Building)?;
    let integrations_dir = config.integrations_dir();
    let summary = build_all(
        runner,
        &report.changes,
        &integrations_dir,
        BuildOptions::from(&config.build),
    )
    .await?;
    let failures = summary.failures();
    let built: Vec<String> = summary.succeeded().map(str::to_string).collect();
    report.builds = summary.results;
    report.skipped = summary.skipped;
    if config.build.failure_policy == FailurePolicy::FailFast {
        if let Some(first) = failures.first() {
            error!(integration = %first.integration, exit_code = ?first.exit_code, "[SYNC][ERROR] Docs build failed");
            return Err(first.clone().into());
        }
    } else if !failures.is_empty() {
        for failed in &failures {
            error!(integration = %failed.integration, exit_code = ?failed.exit_code, output = %failed.output, "[SYNC][ERROR] Docs build failed");
        }
        warn!(failed = failures.len(), "[SYNC] Publishing the integrations that did build");
    }

    // Step 3: stage
    tracker.advance(RunState::Staging)?;
    let mut staging = StagingArea::new()?;
    staging.collect(&integrations_dir, built.iter().map(String::as_str), &pattern)?;
    report.staged = staging.artifacts().to_vec();

    // Step 4: publish
    tracker.advance(RunState::Publishing)?;
    report.published = publish_staging(
        host,
        &staging,
        &config.publish.version,
        config.publish.dry_run,
    )
    .await?;

    if !failures.is_empty() {
        return Err(SyncError::BuildFailures(failures));
    }
    tracker.advance(RunState::Done)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_change_set_goes_straight_to_done() {
        assert!(RunState::Idle.can_transition_to(RunState::Detecting));
        assert!(RunState::Detecting.can_transition_to(RunState::Done));
    }

    #[test]
    fn steps_cannot_be_skipped() {
        assert!(!RunState::Idle.can_transition_to(RunState::Building));
        assert!(!RunState::Building.can_transition_to(RunState::Publishing));
        assert!(!RunState::Staging.can_transition_to(RunState::Done));
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!RunState::Done.can_transition_to(RunState::Failed));
        assert!(!RunState::Failed.can_transition_to(RunState::Detecting));
        assert!(RunState::Publishing.can_transition_to(RunState::Failed));
    }

    #[test]
    fn tracker_rejects_illegal_transitions() {
        let mut tracker = RunTracker::new();
        let err = tracker.advance(RunState::Publishing).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: RunState::Idle,
                to: RunState::Publishing
            }
        ));
        assert_eq!(tracker.state, RunState::Idle);
    }
}
