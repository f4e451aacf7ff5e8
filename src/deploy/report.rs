// ABOUTME: Final pass/fail report of a run, one entry per host.
// ABOUTME: Serializable for --json; every message is already redacted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diagnostics::Warning;
use crate::environment::StageName;
use crate::sync::SyncAction;

use super::ErrorKind;
use super::run::{HostPhase, HostStatus, RunMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// The first fatal error of a host or of the local stages.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    /// `None` when the failure happened before any stage (connect, lock).
    pub stage: Option<StageName>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn stage_label(&self) -> &'static str {
        self.stage.map(|s| s.as_str()).unwrap_or("connect")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub status: HostStatus,
    pub phase: HostPhase,
    pub completed: Vec<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub environment: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub local_stages: Vec<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_failure: Option<StageFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    pub hosts: Vec<HostReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn succeeded_hosts(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.status == HostStatus::Succeeded)
            .count()
    }

    /// Look up a host by its label.
    pub fn host(&self, label: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == label)
    }

    /// Process exit code: 0 only if every host succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}
