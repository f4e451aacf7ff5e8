// ABOUTME: pm2 implementation of the supervisor bridge.
// ABOUTME: Probes for the binary, then startOrReload and save.

use async_trait::async_trait;
use std::time::Duration;

use super::{ReloadRequest, Supervisor};
use crate::deploy::DeployError;
use crate::environment::StageName;
use crate::shell::quote;
use crate::transport::{
    CommandStatus, LineSink, RemoteCommand, RemoteSession, Tail, capture, execute,
};

/// Drives pm2 on the host.
#[derive(Debug, Clone)]
pub struct Pm2 {
    program: String,
}

impl Default for Pm2 {
    fn default() -> Self {
        Self::new("pm2")
    }
}

impl Pm2 {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn probe(
        &self,
        session: &dyn RemoteSession,
        timeout: Duration,
    ) -> Result<(), DeployError> {
        let script = format!("command -v {}", quote(&self.program));
        let output = capture(session, &script, timeout)
            .await
            .map_err(|e| DeployError::from_transport(StageName::Reload, session.label(), e))?;
        if output.success() {
            tracing::debug!(host = %session.label(), "found {}", output.stdout.trim());
            Ok(())
        } else {
            Err(DeployError::SupervisorUnavailable(format!(
                "{} not found on PATH",
                self.program
            )))
        }
    }

    async fn run(
        &self,
        session: &dyn RemoteSession,
        script: &str,
        timeout: Duration,
        sink: &mut dyn LineSink,
    ) -> Result<(), DeployError> {
        let mut tail = Tail::new(sink);
        let status = execute(session, RemoteCommand::new(script, timeout), &mut tail)
            .await
            .map_err(|e| DeployError::from_transport(StageName::Reload, session.label(), e))?;
        classify(&self.program, status, tail.detail())
    }
}

// 126 and 127 are the shell's "not executable" and "not found".
fn classify(program: &str, status: CommandStatus, detail: Option<&str>) -> Result<(), DeployError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(126) | Some(127) => Err(DeployError::SupervisorUnavailable(format!(
            "{} could not be executed ({})",
            program, status
        ))),
        _ => Err(DeployError::command_failed(StageName::Reload, status, detail)),
    }
}

#[async_trait]
impl Supervisor for Pm2 {
    async fn reload(
        &self,
        session: &dyn RemoteSession,
        request: &ReloadRequest<'_>,
        sink: &mut dyn LineSink,
    ) -> Result<(), DeployError> {
        self.probe(session, request.timeout).await?;
        let script = format!(
            "cd {dir} && {pm2} startOrReload {definition} --env {env}",
            dir = quote(request.working_dir),
            pm2 = quote(&self.program),
            definition = quote(request.definition),
            env = quote(request.environment.as_str()),
        );
        tracing::info!(host = %session.label(), "reloading {}", request.definition);
        self.run(session, &script, request.timeout, sink).await
    }

    async fn persist_state(
        &self,
        session: &dyn RemoteSession,
        timeout: Duration,
        sink: &mut dyn LineSink,
    ) -> Result<(), DeployError> {
        let script = format!("{} save", quote(&self.program));
        self.run(session, &script, timeout, sink).await
    }
}
