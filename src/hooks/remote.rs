// ABOUTME: Runs remote hook stages over a host session.
// ABOUTME: Exports run context and non-secret variables, then runs the hook in its directory.

use std::time::Duration;

use super::{HookContext, StageResult, StageSink, StageStatus};
use crate::deploy::DeployError;
use crate::environment::{HookStage, Site};
use crate::shell;
use crate::transport::{RemoteCommand, RemoteSession, TransportError, execute};

/// Run a remote hook in `workdir` on the host.
///
/// Non-zero exits and timeouts come back as a status; a lost connection
/// is an error because nothing else can run on this host.
pub async fn run_remote(
    hook: &HookStage,
    session: &dyn RemoteSession,
    workdir: &str,
    context: &HookContext<'_>,
    timeout: Duration,
    mut sink: StageSink<'_>,
) -> Result<StageResult, DeployError> {
    debug_assert_eq!(hook.site(), Site::Remote);

    let script = build_script(hook, workdir, context);
    tracing::info!(host = %session.label(), "Running {} hook", hook.name);

    let status = match execute(session, RemoteCommand::new(&script, timeout), &mut sink).await {
        Ok(status) => StageStatus::from_command(status),
        Err(TransportError::Timeout(t)) => StageStatus::TimedOut(t),
        Err(e) => return Err(DeployError::from_transport(hook.name, session.label(), e)),
    };

    Ok(sink.into_result(status))
}

fn build_script(hook: &HookStage, workdir: &str, context: &HookContext<'_>) -> String {
    let context_vars = context.to_env();
    let exports = shell::exports(
        context_vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(context.environment.variables.public()),
    );
    let dir = shell::quote(workdir);
    format!(
        "mkdir -p {dir} && cd {dir} && {exports}{action}",
        action = hook.action.shell()
    )
}
