// ABOUTME: Revision command implementation.
// ABOUTME: Reads the recorded commit from every host without changing anything.

use tokio_util::sync::CancellationToken;
use wharf::environment::Environment;
use wharf::error::{Error, Result};
use wharf::output::Output;
use wharf::sync;
use wharf::transport::Transport;

use super::HostOutcome;

/// Print the deployed commit of every host.
pub async fn revision(
    transport: &dyn Transport,
    environment: &Environment,
    fanout: Option<usize>,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    let results = super::each_host(environment, fanout, |host| async move {
        let session = match super::connect(transport, host, cancel).await {
            Ok(session) => session,
            Err(HostOutcome::Failed(reason)) => return HostOutcome::Failed(reason),
            Err(_) => return HostOutcome::Cancelled,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => HostOutcome::Cancelled,
            result = sync::recorded_commit(
                session.as_ref(),
                &environment.layout,
                environment.command_timeout,
            ) => match result {
                Ok(commit) => HostOutcome::Done(commit),
                Err(e) => HostOutcome::Failed(e.to_string()),
            },
        };
        super::close(session).await;
        outcome
    })
    .await;

    let total = results.len();
    let mut failed = 0;
    for (host, outcome) in results {
        match outcome {
            HostOutcome::Done(commit) => output.revision(&host, commit.as_deref()),
            HostOutcome::Failed(reason) => {
                failed += 1;
                output.error(&format!("{}: {}", host, reason));
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
        mode: "revision".to_string(),
        environment: environment.name.to_string(),
        failed,
        total,
    })
}
