// ABOUTME: Run-scoped mutable state: one shared progress record per host.
// ABOUTME: Host tasks update their record; the coordinator turns records into a report.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::diagnostics::{Diagnostics, Warning};
use crate::environment::{Environment, StageName};
use crate::sync::{RevisionHandle, SyncAction};

use super::DeployError;
use super::report::{HostReport, RunReport, RunStatus, StageFailure};

/// Which pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// First-time provisioning: pre-setup, then post-setup and sync per host.
    Setup,
    /// The full pipeline through reload.
    Deploy,
}

impl RunMode {
    /// Local stages, in order, run once before any host task.
    pub fn local_stages(&self) -> &'static [StageName] {
        match self {
            RunMode::Setup => &[StageName::PreSetup],
            RunMode::Deploy => &[StageName::PreSetup, StageName::PreDeployLocal],
        }
    }

    /// Remote stages, in order, run once per host.
    pub fn remote_stages(&self) -> &'static [StageName] {
        match self {
            RunMode::Setup => &[StageName::PostSetup, StageName::Sync],
            RunMode::Deploy => &[
                StageName::PostSetup,
                StageName::Sync,
                StageName::MaterializeEnv,
                StageName::PostDeploy,
                StageName::Reload,
            ],
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Setup => f.write_str("setup"),
            RunMode::Deploy => f.write_str("deploy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// What a host is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostPhase {
    Pending,
    Syncing,
    PipingHooks,
    Materializing,
    Reloading,
    Succeeded,
    Failed,
}

impl HostPhase {
    pub fn for_stage(stage: StageName) -> Self {
        match stage {
            StageName::Sync => HostPhase::Syncing,
            StageName::MaterializeEnv => HostPhase::Materializing,
            StageName::Reload => HostPhase::Reloading,
            StageName::PreSetup
            | StageName::PostSetup
            | StageName::PreDeployLocal
            | StageName::PostDeploy => HostPhase::PipingHooks,
        }
    }
}

/// Progress of one host within a run.
#[derive(Debug, Clone)]
pub struct HostRecord {
    pub host: String,
    pub status: HostStatus,
    pub phase: HostPhase,
    pub current_stage: Option<StageName>,
    pub completed: Vec<StageName>,
    /// Stage in progress when the first fatal error happened; `None` before any stage.
    pub failed_stage: Option<StageName>,
    pub error: Option<DeployError>,
    pub diagnostics: Diagnostics,
    pub commit: Option<String>,
    pub sync_action: Option<SyncAction>,
}

impl HostRecord {
    fn new(host: String) -> Self {
        Self {
            host,
            status: HostStatus::Pending,
            phase: HostPhase::Pending,
            current_stage: None,
            completed: Vec::new(),
            failed_stage: None,
            error: None,
            diagnostics: Diagnostics::default(),
            commit: None,
            sync_action: None,
        }
    }
}

/// Shared handle to a host's record.
///
/// Lives outside the host task so a cancelled or panicked task still
/// leaves its last completed stage behind.
#[derive(Debug, Clone)]
pub struct HostTracker {
    record: Arc<Mutex<HostRecord>>,
}

impl HostTracker {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            record: Arc::new(Mutex::new(HostRecord::new(host.into()))),
        }
    }

    pub fn start(&self) {
        self.record.lock().status = HostStatus::Running;
    }

    pub fn enter(&self, stage: StageName) {
        let mut record = self.record.lock();
        record.current_stage = Some(stage);
        record.phase = HostPhase::for_stage(stage);
    }

    pub fn complete(&self, stage: StageName) {
        let mut record = self.record.lock();
        record.completed.push(stage);
        record.current_stage = None;
    }

    /// Leave a stage without completing it (tolerated optional failure).
    pub fn leave(&self, stage: StageName) {
        let mut record = self.record.lock();
        if record.current_stage == Some(stage) {
            record.current_stage = None;
        }
    }

    pub fn warn(&self, warning: Warning) {
        self.record.lock().diagnostics.record(warning);
    }

    pub fn synced(&self, revision: &RevisionHandle) {
        let mut record = self.record.lock();
        record.commit = Some(revision.commit.clone());
        record.sync_action = Some(revision.action);
    }

    pub fn succeed(&self) {
        let mut record = self.record.lock();
        record.status = HostStatus::Succeeded;
        record.phase = HostPhase::Succeeded;
        record.current_stage = None;
    }

    /// Mark the host failed. Only the first fatal error is kept.
    pub fn fail(&self, error: DeployError) {
        let mut record = self.record.lock();
        if record.error.is_some() {
            return;
        }
        record.status = HostStatus::Failed;
        record.phase = HostPhase::Failed;
        record.failed_stage = record.current_stage.take();
        record.error = Some(error);
    }

    pub fn snapshot(&self) -> HostRecord {
        self.record.lock().clone()
    }
}

/// Everything one invocation accumulates. Never persisted.
#[derive(Debug)]
pub struct DeploymentRun {
    environment: Arc<Environment>,
    mode: RunMode,
    started_at: DateTime<Utc>,
    local_completed: Vec<StageName>,
    local_failure: Option<(StageName, DeployError)>,
    diagnostics: Diagnostics,
    hosts: Vec<HostTracker>,
}

impl DeploymentRun {
    pub fn new(environment: Arc<Environment>, mode: RunMode) -> Self {
        let hosts = environment
            .hosts
            .iter()
            .map(|h| HostTracker::new(h.label()))
            .collect();
        Self {
            environment,
            mode,
            started_at: Utc::now(),
            local_completed: Vec::new(),
            local_failure: None,
            diagnostics: Diagnostics::default(),
            hosts,
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn hosts(&self) -> &[HostTracker] {
        &self.hosts
    }

    pub fn local_completed(&mut self, stage: StageName) {
        self.local_completed.push(stage);
    }

    pub fn local_failed(&mut self, stage: StageName, error: DeployError) {
        self.local_failure = Some((stage, error));
    }

    pub fn warn(&mut self, warning: Warning) {
        self.diagnostics.record(warning);
    }

    /// Build the final report, masking secrets in every message.
    pub fn into_report(self) -> RunReport {
        let redactor = self.environment.redactor();
        let redact = |text: &str| redactor.redact(text).into_owned();

        let hosts: Vec<HostReport> = self
            .hosts
            .iter()
            .map(|tracker| {
                let record = tracker.snapshot();
                HostReport {
                    host: record.host,
                    status: record.status,
                    phase: record.phase,
                    completed: record.completed,
                    commit: record.commit,
                    sync: record.sync_action,
                    failure: record.error.map(|e| StageFailure {
                        stage: record.failed_stage,
                        kind: e.kind(),
                        message: redact(&e.to_string()),
                    }),
                    warnings: record.diagnostics.redacted(&redactor),
                }
            })
            .collect();

        let local_failure = self.local_failure.map(|(stage, e)| StageFailure {
            stage: Some(stage),
            kind: e.kind(),
            message: redact(&e.to_string()),
        });

        let status = if local_failure.is_none()
            && hosts.iter().all(|h| h.status == HostStatus::Succeeded)
        {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        RunReport {
            environment: self.environment.name.to_string(),
            mode: self.mode,
            status,
            started_at: self.started_at,
            finished_at: Utc::now(),
            local_stages: self.local_completed,
            local_failure,
            warnings: self.diagnostics.redacted(&redactor),
            hosts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::ErrorKind;

    #[test]
    fn phase_follows_stage_activity() {
        assert_eq!(HostPhase::for_stage(StageName::PostSetup), HostPhase::PipingHooks);
        assert_eq!(HostPhase::for_stage(StageName::PostDeploy), HostPhase::PipingHooks);
        assert_eq!(HostPhase::for_stage(StageName::Sync), HostPhase::Syncing);
        assert_eq!(
            HostPhase::for_stage(StageName::MaterializeEnv),
            HostPhase::Materializing
        );
        assert_eq!(HostPhase::for_stage(StageName::Reload), HostPhase::Reloading);
    }

    #[test]
    fn tracker_records_failed_stage() {
        let tracker = HostTracker::new("deploy@web1");
        tracker.start();
        tracker.enter(StageName::PostSetup);
        tracker.complete(StageName::PostSetup);
        tracker.enter(StageName::Sync);
        tracker.fail(DeployError::SyncConflict("dirty".into()));
        tracker.fail(DeployError::Cancelled);

        let record = tracker.snapshot();
        assert_eq!(record.status, HostStatus::Failed);
        assert_eq!(record.completed, [StageName::PostSetup]);
        assert_eq!(record.failed_stage, Some(StageName::Sync));
        assert_eq!(record.error.unwrap().kind(), ErrorKind::SyncConflict);
    }

    #[test]
    fn tolerated_stage_is_not_completed() {
        let tracker = HostTracker::new("deploy@web1");
        tracker.enter(StageName::PostDeploy);
        tracker.leave(StageName::PostDeploy);
        let record = tracker.snapshot();
        assert!(record.completed.is_empty());
        assert_eq!(record.current_stage, None);
    }

    #[test]
    fn setup_mode_stops_after_sync() {
        assert_eq!(
            RunMode::Setup.remote_stages(),
            [StageName::PostSetup, StageName::Sync]
        );
        assert_eq!(RunMode::Deploy.remote_stages().last(), Some(&StageName::Reload));
        assert_eq!(RunMode::Setup.local_stages(), [StageName::PreSetup]);
    }
}
