// ABOUTME: Exec command implementation.
// ABOUTME: Runs an ad-hoc shell command in the current checkout of every host.

use tokio_util::sync::CancellationToken;
use wharf::environment::{Environment, Host};
use wharf::error::{Error, Result};
use wharf::output::Output;
use wharf::redact::Redactor;
use wharf::shell::quote;
use wharf::transport::{
    CommandStatus, LineSink, OutputStream, RemoteCommand, Transport, execute,
};

use super::HostOutcome;

/// Execute a command on every host of the environment.
pub async fn exec(
    transport: &dyn Transport,
    environment: &Environment,
    command: &[String],
    fanout: Option<usize>,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    // Words are joined as typed so pipes and && keep working on the host.
    let script = format!(
        "cd {} && {}",
        quote(&environment.layout.current()),
        command.join(" ")
    );
    let redactor = environment.redactor();

    let script = script.as_str();
    let redactor = &redactor;
    let results = super::each_host(environment, fanout, |host| async move {
        exec_on_host(environment, transport, host, script, redactor, output, cancel).await
    })
    .await;

    let total = results.len();
    let mut failed = 0;
    for (host, outcome) in results {
        match outcome {
            HostOutcome::Done(status) if status.success() => {}
            HostOutcome::Done(status) => {
                failed += 1;
                output.error(&format!("{}: {}", host, status));
            }
            HostOutcome::Failed(reason) => {
                failed += 1;
                output.error(&format!("{}: {}", host, redactor.redact(&reason)));
            }
            HostOutcome::Cancelled => {
                failed += 1;
                output.error(&format!("{}: cancelled", host));
            }
        }
    }

    if failed == 0 {
        return Ok(());
    }
    Err(Error::RunFailed {
        mode: "exec".to_string(),
        environment: environment.name.to_string(),
        failed,
        total,
    })
}

async fn exec_on_host(
    environment: &Environment,
    transport: &dyn Transport,
    host: &Host,
    script: &str,
    redactor: &Redactor,
    output: &Output,
    cancel: &CancellationToken,
) -> HostOutcome<CommandStatus> {
    let session = match super::connect(transport, host, cancel).await {
        Ok(session) => session,
        Err(HostOutcome::Failed(reason)) => return HostOutcome::Failed(reason),
        Err(_) => return HostOutcome::Cancelled,
    };

    let label = host.label();
    let mut sink = redactor.sink(HostLines {
        host: &label,
        output,
    });
    let command = RemoteCommand::new(script, environment.command_timeout);
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => HostOutcome::Cancelled,
        result = execute(session.as_ref(), command, &mut sink) => match result {
            Ok(status) => HostOutcome::Done(status),
            Err(e) => HostOutcome::Failed(e.to_string()),
        },
    };

    super::close(session).await;
    outcome
}

/// Prints each line prefixed with its host.
struct HostLines<'a> {
    host: &'a str,
    output: &'a Output,
}

impl LineSink for HostLines<'_> {
    fn line(&mut self, stream: OutputStream, line: &str) {
        self.output.host_line(self.host, stream, line);
    }
}
