// ABOUTME: Deployment coordinator: local stages once, then one task per host.
// ABOUTME: Bounded fan-out via a semaphore, cooperative cancellation, single report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Warning, WarningKind};
use crate::environment::{Environment, Host};
use crate::hooks::{self, HookContext, StageOutcome, StageSink};
use crate::output::Output;
use crate::redact::Redactor;
use crate::supervisor::Supervisor;
use crate::sync::RevisionHandle;
use crate::transport::{RemoteSession, Transport};

use super::DeployError;
use super::lock::DeployLock;
use super::pipeline::{HostContext, HostPipeline};
use super::report::RunReport;
use super::run::{DeploymentRun, HostStatus, HostTracker, RunMode};

/// Time left to remove a lock once the run is cancelled.
const RELEASE_AFTER_CANCEL: Duration = Duration::from_secs(5);

/// Per-invocation knobs that are not part of the environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the environment's fan-out.
    pub fanout: Option<usize>,
    /// Break a lock held by another run.
    pub force_lock: bool,
    /// Working directory for local stages (the config file's directory).
    pub workdir: Option<PathBuf>,
}

/// Runs setup and deploy passes over an environment's hosts.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    supervisor: Arc<dyn Supervisor>,
    output: Option<Arc<Output>>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn Transport>, supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            transport,
            supervisor,
            output: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Echo stage output to the operator.
    pub fn with_output(mut self, output: Arc<Output>) -> Self {
        self.output = Some(output);
        self
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `mode` against every host of `environment`.
    ///
    /// Never fails as a whole: every outcome, including local stage
    /// failures and cancellation, is described by the returned report.
    pub async fn run(
        &self,
        environment: Arc<Environment>,
        mode: RunMode,
        options: &RunOptions,
    ) -> RunReport {
        let mut run = DeploymentRun::new(Arc::clone(&environment), mode);
        let redactor = Arc::new(environment.redactor());

        tracing::info!(
            environment = %environment.name,
            hosts = environment.hosts.len(),
            "starting {}",
            mode
        );

        if self.run_local_stages(&mut run, &redactor, options).await {
            self.run_hosts(&run, &redactor, options).await;
        }

        let report = run.into_report();
        tracing::info!(
            environment = %report.environment,
            "{} finished: {}/{} host(s) succeeded",
            mode,
            report.succeeded_hosts(),
            report.hosts.len()
        );
        report
    }

    /// Run local stages in order. Returns false if the run must stop.
    async fn run_local_stages(
        &self,
        run: &mut DeploymentRun,
        redactor: &Redactor,
        options: &RunOptions,
    ) -> bool {
        let environment = Arc::clone(run.environment());
        for &stage in run.mode().local_stages() {
            let Some(hook) = environment.hook(stage) else {
                continue;
            };

            let mut sink = StageSink::new(stage, redactor);
            if let Some(output) = &self.output {
                sink = sink.echo(output);
            }
            let context = HookContext::local(&environment);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    run.local_failed(stage, DeployError::Cancelled);
                    return false;
                }
                result = hooks::run_local(
                    hook,
                    &context,
                    options.workdir.as_deref(),
                    environment.command_timeout,
                    sink,
                ) => result,
            };

            match result.enforce(hook.requirement) {
                Ok(StageOutcome::Completed(_)) => run.local_completed(stage),
                Ok(StageOutcome::Tolerated { warning, .. }) => {
                    let message = redactor.redact(&warning);
                    run.warn(Warning::new(WarningKind::OptionalStage, message).at(stage));
                }
                Err(e) => {
                    tracing::error!("local stage {} failed: {}", stage, redactor.redact(&e.to_string()));
                    run.local_failed(stage, e);
                    return false;
                }
            }
        }
        true
    }

    async fn run_hosts(&self, run: &DeploymentRun, redactor: &Arc<Redactor>, options: &RunOptions) {
        let environment = run.environment();
        let fanout = options.fanout.unwrap_or(environment.fanout).max(1);
        let permits = Arc::new(Semaphore::new(fanout));
        tracing::debug!("fan-out {}", fanout);

        let mut tasks = JoinSet::new();
        for (index, tracker) in run.hosts().iter().enumerate() {
            let task = HostTask {
                environment: Arc::clone(environment),
                index,
                mode: run.mode(),
                tracker: tracker.clone(),
                transport: Arc::clone(&self.transport),
                supervisor: Arc::clone(&self.supervisor),
                output: self.output.clone(),
                redactor: Arc::clone(redactor),
                cancel: self.cancel.clone(),
                permits: Arc::clone(&permits),
                force_lock: options.force_lock,
            };
            tasks.spawn(task.run());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("host task ended abnormally: {}", e);
            }
        }

        // A task that panicked never reached a terminal state.
        for tracker in run.hosts() {
            let record = tracker.snapshot();
            if matches!(record.status, HostStatus::Pending | HostStatus::Running) {
                tracker.fail(DeployError::Cancelled);
            }
        }
    }
}

/// Everything one host task owns.
struct HostTask {
    environment: Arc<Environment>,
    index: usize,
    mode: RunMode,
    tracker: HostTracker,
    transport: Arc<dyn Transport>,
    supervisor: Arc<dyn Supervisor>,
    output: Option<Arc<Output>>,
    redactor: Arc<Redactor>,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    force_lock: bool,
}

impl HostTask {
    async fn run(self) {
        let Some(host) = self.environment.hosts.get(self.index) else {
            return;
        };
        let label = host.label();

        // Held until the session is closed, so open sessions never exceed the fan-out.
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.tracker.fail(DeployError::Cancelled);
                return;
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.tracker.fail(DeployError::Cancelled);
                    return;
                }
            },
        };

        self.tracker.start();
        tracing::info!(host = %label, "connecting");

        let session = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.tracker.fail(DeployError::Cancelled);
                return;
            }
            result = self.transport.connect(host) => match result {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!(host = %label, "connect failed: {}", e);
                    self.tracker.fail(DeployError::UnreachableHost {
                        host: label,
                        reason: e.to_string(),
                    });
                    return;
                }
            },
        };

        let result = self.drive(host, session.as_ref()).await;

        if let Err(e) = session.close().await {
            self.tracker
                .warn(Warning::new(WarningKind::SshDisconnect, e.to_string()));
        }

        match result {
            Ok(revision) => {
                tracing::info!(host = %label, commit = %revision.commit, "host succeeded");
                self.tracker.succeed();
            }
            Err(e) => {
                tracing::error!(host = %label, "host failed: {}", self.redactor.redact(&e.to_string()));
                self.tracker.fail(e);
            }
        }
    }

    /// Lock, run the pipeline, and always release the lock before returning.
    async fn drive(
        &self,
        host: &Host,
        session: &dyn RemoteSession,
    ) -> Result<RevisionHandle, DeployError> {
        let env = &*self.environment;

        let mut lock = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            lock = DeployLock::acquire(
                session,
                &env.layout,
                &env.name,
                self.force_lock,
                env.command_timeout,
            ) => lock?,
        };
        if let Some(broken) = lock.broken() {
            self.tracker.warn(Warning::new(WarningKind::LockBroken, format!(
                "broke lock held by {} (pid {}) since {}",
                broken.holder, broken.pid, broken.started_at
            )));
        }

        let ctx = HostContext {
            environment: env,
            host,
            session,
            supervisor: self.supervisor.as_ref(),
            tracker: &self.tracker,
            redactor: &self.redactor,
            output: self.output.as_deref(),
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled),
            result = pipeline(ctx, self.mode) => result,
        };

        if self.cancel.is_cancelled() {
            lock.cap_timeout(RELEASE_AFTER_CANCEL);
        }
        if let Err(e) = lock.release().await {
            self.tracker
                .warn(Warning::new(WarningKind::LockRelease, e.to_string()));
        }
        result
    }
}

async fn pipeline(ctx: HostContext<'_>, mode: RunMode) -> Result<RevisionHandle, DeployError> {
    let synced = HostPipeline::new(ctx).setup().await?.sync().await?;
    match mode {
        RunMode::Setup => Ok(synced.finish()),
        RunMode::Deploy => Ok(synced
            .materialize()
            .await?
            .post_deploy()
            .await?
            .reload()
            .await?
            .finish()),
    }
}
