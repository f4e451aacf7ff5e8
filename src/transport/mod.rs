// ABOUTME: Transport layer: remote command sessions with streamed output.
// ABOUTME: Defines the Transport/RemoteSession seam plus SSH and loopback backends.

mod error;
mod lines;
mod local;
pub mod process;
mod sink;
mod ssh;

pub use error::TransportError;
pub use lines::{LineSplitter, MAX_LINE_BYTES};
pub use local::LocalTransport;
pub use sink::{CapturedLine, CapturedOutput, Collect, Discard, LineSink, OutputStream, Tail};
pub use ssh::SshTransport;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::environment::Host;

/// Opens sessions to hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and authenticate. Failures are reported as `Unreachable`.
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, TransportError>;
}

/// An open session to one host, reused for every command of its pipeline.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Host label used in logs and reports.
    fn label(&self) -> &str;

    /// Run a shell script to completion, streaming output line by line.
    ///
    /// Callers normally go through [`execute`], which applies the timeout.
    async fn run(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<CommandStatus, TransportError>;

    /// Close the session. Consuming `self` makes a second close impossible.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
}

impl CommandStatus {
    pub fn from_code(code: u32) -> Self {
        Self {
            code: Some(code as i32),
        }
    }

    pub fn from_exit_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }

    /// Exit code, or `None` when the process was killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A command to run on a session.
pub struct RemoteCommand<'a> {
    pub script: &'a str,
    pub stdin: Option<&'a [u8]>,
    pub timeout: Duration,
}

impl<'a> RemoteCommand<'a> {
    pub fn new(script: &'a str, timeout: Duration) -> Self {
        Self {
            script,
            stdin: None,
            timeout,
        }
    }

    pub fn stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }
}

// stdin may carry secrets; only its size is ever printed.
impl fmt::Debug for RemoteCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("script", &self.script)
            .field("stdin", &self.stdin.map(|s| format!("<{} bytes>", s.len())))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Execute a command, failing with `Timeout` if it does not finish in time.
pub async fn execute(
    session: &dyn RemoteSession,
    command: RemoteCommand<'_>,
    sink: &mut dyn LineSink,
) -> Result<CommandStatus, TransportError> {
    tracing::trace!(host = %session.label(), script = %command.script, "executing");
    match tokio::time::timeout(
        command.timeout,
        session.run(command.script, command.stdin, sink),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(command.timeout)),
    }
}

/// Output of a short control command, fully collected.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run a short control command and collect its output.
pub async fn capture(
    session: &dyn RemoteSession,
    script: &str,
    timeout: Duration,
) -> Result<CommandOutput, TransportError> {
    let mut collect = Collect::default();
    let status = execute(session, RemoteCommand::new(script, timeout), &mut collect).await?;
    Ok(CommandOutput {
        status,
        stdout: collect.stdout,
        stderr: collect.stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_debug_hides_stdin() {
        let command =
            RemoteCommand::new("cat > f", Duration::from_secs(1)).stdin(b"SECRET=hunter2");
        let debug = format!("{:?}", command);
        assert!(debug.contains("<14 bytes>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn status_success_requires_zero() {
        assert!(CommandStatus::from_code(0).success());
        assert!(!CommandStatus::from_code(1).success());
        assert_eq!(CommandStatus::from_code(127).code(), Some(127));
    }
}
