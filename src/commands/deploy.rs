// ABOUTME: Setup and deploy command implementation.
// ABOUTME: Builds the coordinator over SSH and pm2, then prints the run report.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wharf::deploy::{Coordinator, RunMode, RunOptions};
use wharf::environment::Environment;
use wharf::error::{Error, Result};
use wharf::output::Output;
use wharf::supervisor::Pm2;
use wharf::transport::Transport;

/// Run setup or deploy against every host of an environment.
pub async fn run(
    transport: Arc<dyn Transport>,
    environment: Environment,
    mode: RunMode,
    options: RunOptions,
    mut output: Output,
    cancel: CancellationToken,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Running {} of {} ({}) on {} host(s)",
        mode,
        environment.name,
        environment.revision,
        environment.hosts.len()
    ));
    let stages: Vec<&str> = mode.remote_stages().iter().map(|s| s.as_str()).collect();
    tracing::debug!("remote stages: {}", stages.join(", "));

    let environment = Arc::new(environment);
    let output = Arc::new(output);
    let supervisor = Pm2::new(environment.supervisor.program.clone());
    let coordinator = Coordinator::new(transport, Arc::new(supervisor))
        .with_output(Arc::clone(&output))
        .with_cancellation(cancel);

    let report = coordinator.run(environment, mode, &options).await;
    output.report(&report);

    if report.succeeded() {
        return Ok(());
    }
    let total = report.hosts.len();
    Err(Error::RunFailed {
        mode: mode.to_string(),
        environment: report.environment.clone(),
        failed: total - report.succeeded_hosts(),
        total,
    })
}
