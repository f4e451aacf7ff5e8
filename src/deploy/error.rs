// ABOUTME: Error taxonomy for deployment stages.
// ABOUTME: Each variant maps to one reportable ErrorKind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::environment::StageName;
use crate::transport::TransportError;

/// Errors that end a host's pipeline (or are recorded for optional stages).
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeployError {
    /// Connection or authentication failed, or the connection was lost.
    #[error("host {host} unreachable: {reason}")]
    UnreachableHost { host: String, reason: String },

    /// A command did not finish within its bound.
    #[error("{stage} timed out after {timeout:?}")]
    CommandTimeout { stage: StageName, timeout: Duration },

    /// A command exited non-zero.
    #[error("{stage} failed ({status}){}", detail_suffix(.detail))]
    CommandFailed {
        stage: StageName,
        status: String,
        detail: Option<String>,
    },

    /// The revision does not exist in the repository.
    #[error("revision {0} not found")]
    RevisionNotFound(String),

    /// The working copy has changes the synchronizer did not make.
    #[error("working copy conflict: {0}")]
    SyncConflict(String),

    /// The env file could not be written.
    #[error("failed to write environment file: {0}")]
    MaterializeFailed(String),

    /// The process supervisor cannot be reached on the host.
    #[error("process supervisor unavailable: {0}")]
    SupervisorUnavailable(String),

    /// Another deployment holds the host's lock.
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    /// The lock could not be taken or inspected.
    #[error("deploy lock error: {0}")]
    LockFailed(String),

    /// The operator cancelled the run.
    #[error("deployment cancelled")]
    Cancelled,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!(": {}", d),
        _ => String::new(),
    }
}

/// Reportable category of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnreachableHost,
    CommandTimeout,
    CommandFailed,
    RevisionNotFound,
    SyncConflict,
    MaterializeFailed,
    SupervisorUnavailable,
    LockHeld,
    LockFailed,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnreachableHost => "UnreachableHost",
            ErrorKind::CommandTimeout => "CommandTimeout",
            ErrorKind::CommandFailed => "CommandFailed",
            ErrorKind::RevisionNotFound => "RevisionNotFound",
            ErrorKind::SyncConflict => "SyncConflict",
            ErrorKind::MaterializeFailed => "MaterializeFailed",
            ErrorKind::SupervisorUnavailable => "SupervisorUnavailable",
            ErrorKind::LockHeld => "LockHeld",
            ErrorKind::LockFailed => "LockFailed",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::UnreachableHost { .. } => ErrorKind::UnreachableHost,
            DeployError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            DeployError::CommandFailed { .. } => ErrorKind::CommandFailed,
            DeployError::RevisionNotFound(_) => ErrorKind::RevisionNotFound,
            DeployError::SyncConflict(_) => ErrorKind::SyncConflict,
            DeployError::MaterializeFailed(_) => ErrorKind::MaterializeFailed,
            DeployError::SupervisorUnavailable(_) => ErrorKind::SupervisorUnavailable,
            DeployError::LockHeld { .. } => ErrorKind::LockHeld,
            DeployError::LockFailed(_) => ErrorKind::LockFailed,
            DeployError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn command_failed(
        stage: StageName,
        status: impl fmt::Display,
        detail: Option<&str>,
    ) -> Self {
        DeployError::CommandFailed {
            stage,
            status: status.to_string(),
            detail: detail.map(str::to_string),
        }
    }

    /// Classify a transport failure that happened while running `stage`.
    pub fn from_transport(stage: StageName, host: &str, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(timeout) => DeployError::CommandTimeout { stage, timeout },
            TransportError::Io(e) => {
                DeployError::command_failed(stage, "could not start", Some(&e.to_string()))
            }
            other => DeployError::UnreachableHost {
                host: host.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_display_as_taxonomy_names() {
        assert_eq!(
            DeployError::SyncConflict("x".into()).kind().to_string(),
            "SyncConflict"
        );
        assert_eq!(DeployError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn command_failed_message_includes_detail() {
        let err = DeployError::command_failed(StageName::PostSetup, "exit code 2", Some("boom"));
        assert_eq!(err.to_string(), "post-setup failed (exit code 2): boom");

        let bare = DeployError::command_failed(StageName::PostDeploy, "exit code 1", None);
        assert_eq!(bare.to_string(), "post-deploy failed (exit code 1)");
    }

    #[test]
    fn transport_errors_are_classified() {
        let timeout = DeployError::from_transport(
            StageName::Sync,
            "web1",
            TransportError::Timeout(Duration::from_secs(5)),
        );
        assert_eq!(timeout.kind(), ErrorKind::CommandTimeout);

        let lost =
            DeployError::from_transport(StageName::Sync, "web1", TransportError::ChannelClosed);
        assert_eq!(lost.kind(), ErrorKind::UnreachableHost);
    }
}
