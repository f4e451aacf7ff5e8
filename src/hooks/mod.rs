// ABOUTME: Hook pipeline stages: running user hooks locally or on a host.
// ABOUTME: Captures redacted output and applies the required/optional failure policy.

mod local;
mod remote;

pub use local::run_local;
pub use remote::run_remote;

use std::time::Duration;

use crate::deploy::DeployError;
use crate::environment::{Environment, Host, Requirement, StageName};
use crate::output::Output;
use crate::redact::Redactor;
use crate::transport::{CapturedOutput, CommandStatus, LineSink, OutputStream};

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub environment: &'a Environment,
    pub host: Option<&'a Host>,
    pub commit: Option<&'a str>,
}

impl<'a> HookContext<'a> {
    pub fn local(environment: &'a Environment) -> Self {
        Self {
            environment,
            host: None,
            commit: None,
        }
    }

    pub fn remote(environment: &'a Environment, host: &'a Host, commit: Option<&'a str>) -> Self {
        Self {
            environment,
            host: Some(host),
            commit,
        }
    }

    /// Context variables describing the run.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (
                "WHARF_ENVIRONMENT".to_string(),
                self.environment.name.to_string(),
            ),
            (
                "WHARF_REVISION".to_string(),
                self.environment.revision.to_string(),
            ),
            (
                "WHARF_TARGET_PATH".to_string(),
                self.environment.layout.root().to_string(),
            ),
        ];
        if let Some(host) = self.host {
            env.push(("WHARF_HOST".to_string(), host.address.clone()));
        }
        if let Some(commit) = self.commit {
            env.push(("WHARF_COMMIT".to_string(), commit.to_string()));
        }
        env
    }
}

/// How a stage's command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed { code: Option<i32>, reason: String },
    TimedOut(Duration),
}

impl StageStatus {
    pub fn from_command(status: CommandStatus) -> Self {
        if status.success() {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed {
                code: status.code(),
                reason: status.to_string(),
            }
        }
    }
}

/// Result of running one stage: status plus captured, redacted output.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    pub output: CapturedOutput,
}

/// A stage result after the failure policy has been applied.
#[derive(Debug)]
pub enum StageOutcome {
    Completed(StageResult),
    /// An optional stage failed; the pipeline continues with a warning.
    Tolerated { result: StageResult, warning: String },
}

impl StageResult {
    /// The error this result represents, if it failed.
    pub fn error(&self) -> Option<DeployError> {
        match &self.status {
            StageStatus::Succeeded => None,
            StageStatus::Failed { reason, .. } => Some(DeployError::command_failed(
                self.stage,
                reason,
                self.output.last_error_line(),
            )),
            StageStatus::TimedOut(timeout) => Some(DeployError::CommandTimeout {
                stage: self.stage,
                timeout: *timeout,
            }),
        }
    }

    /// Required failures become errors; optional failures become warnings.
    pub fn enforce(self, requirement: Requirement) -> Result<StageOutcome, DeployError> {
        match (self.error(), requirement) {
            (None, _) => Ok(StageOutcome::Completed(self)),
            (Some(err), Requirement::Required) => Err(err),
            (Some(err), Requirement::Optional) => Ok(StageOutcome::Tolerated {
                warning: format!("optional stage {}", err),
                result: self,
            }),
        }
    }
}

/// Sink for a stage: masks secrets, echoes to the operator, keeps a tail.
pub struct StageSink<'a> {
    stage: StageName,
    host: Option<&'a str>,
    redactor: &'a Redactor,
    output: Option<&'a Output>,
    capture: CapturedOutput,
}

impl<'a> StageSink<'a> {
    pub fn new(stage: StageName, redactor: &'a Redactor) -> Self {
        Self {
            stage,
            host: None,
            redactor,
            output: None,
            capture: CapturedOutput::default(),
        }
    }

    pub fn host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }

    pub fn echo(mut self, output: &'a Output) -> Self {
        self.output = Some(output);
        self
    }

    pub fn into_capture(self) -> CapturedOutput {
        self.capture
    }

    pub fn into_result(self, status: StageStatus) -> StageResult {
        StageResult {
            stage: self.stage,
            status,
            output: self.capture,
        }
    }
}

impl LineSink for StageSink<'_> {
    fn line(&mut self, stream: OutputStream, line: &str) {
        let masked = self.redactor.redact(line);
        if let Some(output) = self.output {
            output.stage_line(self.host, self.stage, stream, &masked);
        }
        self.capture.push(stream, masked.into_owned());
    }
}
