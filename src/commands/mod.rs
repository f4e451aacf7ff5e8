// ABOUTME: Command module aggregator for the wharf CLI.
// ABOUTME: Re-exports the run, exec, revision, and list command handlers.

mod deploy;
mod exec;
mod list;
mod revision;

pub use deploy::run;
pub use exec::exec;
pub use list::list;
pub use revision::revision;

use futures::stream::{self, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use wharf::environment::{Environment, Host};
use wharf::transport::{RemoteSession, Transport};

/// What happened on one host for an ad-hoc command.
enum HostOutcome<T> {
    Done(T),
    Failed(String),
    Cancelled,
}

/// Run `f` on every host, at most `fanout` at a time. Results keep host order.
async fn each_host<'a, F, Fut, T>(
    environment: &'a Environment,
    fanout: Option<usize>,
    f: F,
) -> Vec<(String, HostOutcome<T>)>
where
    F: Fn(&'a Host) -> Fut,
    Fut: Future<Output = HostOutcome<T>>,
{
    let limit = fanout.unwrap_or(environment.fanout).max(1);
    stream::iter(environment.hosts.iter())
        .map(|host| {
            let label = host.label();
            let outcome = f(host);
            async move { (label, outcome.await) }
        })
        .buffered(limit)
        .collect()
        .await
}

/// Open a session unless the run is cancelled first.
async fn connect(
    transport: &dyn Transport,
    host: &Host,
    cancel: &CancellationToken,
) -> Result<Box<dyn RemoteSession>, HostOutcome<()>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HostOutcome::Cancelled),
        session = transport.connect(host) => session.map_err(|e| HostOutcome::Failed(e.to_string())),
    }
}

async fn close(session: Box<dyn RemoteSession>) {
    let label = session.label().to_string();
    if let Err(e) = session.close().await {
        tracing::warn!(host = %label, "failed to close session: {}", e);
    }
}
