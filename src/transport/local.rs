// ABOUTME: Loopback transport that runs "remote" scripts on the operator machine.
// ABOUTME: Lets the whole pipeline run against local directories.

use async_trait::async_trait;

use super::process::{ShellCommand, run_shell};
use super::{CommandStatus, LineSink, RemoteSession, Transport, TransportError};
use crate::environment::Host;

/// Executes every command through a local `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, TransportError> {
        tracing::debug!(host = %host.label(), "opening loopback session");
        Ok(Box::new(LocalSession {
            label: host.label(),
        }))
    }
}

#[derive(Debug)]
struct LocalSession {
    label: String,
}

#[async_trait]
impl RemoteSession for LocalSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<CommandStatus, TransportError> {
        let command = ShellCommand {
            script,
            stdin,
            ..Default::default()
        };
        Ok(run_shell(command, sink).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        tracing::debug!(host = %self.label, "closing loopback session");
        Ok(())
    }
}
