// ABOUTME: Runs local hook stages on the operator's machine.
// ABOUTME: Hooks get run context plus every resolved variable in their environment.

use std::path::Path;
use std::time::Duration;

use super::{HookContext, StageResult, StageSink, StageStatus};
use crate::environment::{HookStage, Site};
use crate::transport::process::{ShellCommand, run_shell};
use crate::transport::{LineSink, OutputStream};

/// Run a local hook to completion (or until `timeout`).
///
/// Never fails outright: spawn errors and timeouts are reported through
/// the returned status so the caller can apply the stage's policy.
pub async fn run_local(
    hook: &HookStage,
    context: &HookContext<'_>,
    workdir: Option<&Path>,
    timeout: Duration,
    mut sink: StageSink<'_>,
) -> StageResult {
    debug_assert_eq!(hook.site(), Site::Local);

    let script = hook.action.shell();
    let mut envs = context.to_env();
    envs.extend(
        context
            .environment
            .variables
            .iter()
            .map(|(name, var)| (name.to_string(), var.value.clone())),
    );

    tracing::info!("Running {} hook locally", hook.name);

    let command = ShellCommand {
        script: &script,
        cwd: workdir,
        envs,
        stdin: None,
    };

    let result = tokio::time::timeout(timeout, run_shell(command, &mut sink)).await;
    let status = match result {
        Ok(Ok(status)) => StageStatus::from_command(status),
        Ok(Err(e)) => {
            tracing::error!("Failed to execute {} hook: {}", hook.name, e);
            sink.line(OutputStream::Stderr, &e.to_string());
            StageStatus::Failed {
                code: None,
                reason: "could not start".to_string(),
            }
        }
        Err(_) => StageStatus::TimedOut(timeout),
    };

    match &status {
        StageStatus::Succeeded => tracing::info!("{} hook completed successfully", hook.name),
        other => tracing::warn!("{} hook did not succeed: {:?}", hook.name, other),
    }

    sink.into_result(status)
}
