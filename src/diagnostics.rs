// ABOUTME: Non-fatal findings gathered while a run progresses.
// ABOUTME: Warnings never change a host's status; they ride along in the report.

use serde::Serialize;

use crate::environment::StageName;
use crate::redact::Redactor;

/// What a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// An optional stage failed or timed out and the host continued.
    OptionalStage,
    /// A stale or forced deploy lock was removed.
    LockBroken,
    /// The lock file could not be removed at the end of the run.
    LockRelease,
    /// The session did not close cleanly.
    SshDisconnect,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: None,
            message: message.into(),
        }
    }

    /// Attribute the warning to a stage.
    pub fn at(mut self, stage: StageName) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// Warnings for one host, or for the run as a whole.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Warning>);

impl Diagnostics {
    /// Log and keep a warning.
    pub fn record(&mut self, warning: Warning) {
        match warning.stage {
            Some(stage) => tracing::warn!(kind = ?warning.kind, %stage, "{}", warning.message),
            None => tracing::warn!(kind = ?warning.kind, "{}", warning.message),
        }
        self.0.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the warnings with every message masked.
    pub fn redacted(self, redactor: &Redactor) -> Vec<Warning> {
        self.0
            .into_iter()
            .map(|w| Warning {
                message: redactor.redact(&w.message).into_owned(),
                ..w
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_keep_order_and_stage() {
        let mut diagnostics = Diagnostics::default();
        assert!(diagnostics.is_empty());

        diagnostics.record(Warning::new(WarningKind::LockBroken, "stale lock"));
        diagnostics.record(
            Warning::new(WarningKind::OptionalStage, "exit code 1").at(StageName::PostDeploy),
        );

        let warnings = diagnostics.redacted(&Redactor::default());
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].stage, None);
        assert_eq!(warnings[1].kind, WarningKind::OptionalStage);
        assert_eq!(warnings[1].stage, Some(StageName::PostDeploy));
    }

    #[test]
    fn serializes_kebab_case_and_skips_missing_stage() {
        let json = serde_json::to_value(Warning::new(WarningKind::SshDisconnect, "reset")).unwrap();
        assert_eq!(json["kind"], "ssh-disconnect");
        assert!(json.get("stage").is_none());

        let json = serde_json::to_value(
            Warning::new(WarningKind::OptionalStage, "x").at(StageName::PreDeployLocal),
        )
        .unwrap();
        assert_eq!(json["kind"], "optional-stage");
        assert_eq!(json["stage"], "pre-deploy-local");
    }
}
