// ABOUTME: Per-host pipeline using the type state pattern.
// ABOUTME: Each transition consumes self, so stages cannot be skipped or reordered.

use crate::diagnostics::{Warning, WarningKind};
use crate::environment::{Environment, Host, StageName};
use crate::hooks::{self, HookContext, StageOutcome, StageSink};
use crate::materialize;
use crate::output::Output;
use crate::redact::Redactor;
use crate::supervisor::{ReloadRequest, Supervisor};
use crate::sync::{self, RevisionHandle};
use crate::transport::RemoteSession;

use super::DeployError;
use super::run::HostTracker;
use super::state::{Connected, Materialized, PostDeployed, Reloaded, SetUp, Synced};

/// Everything a host's stages need. All borrowed from the host task.
#[derive(Clone, Copy)]
pub struct HostContext<'a> {
    pub environment: &'a Environment,
    pub host: &'a Host,
    pub session: &'a dyn RemoteSession,
    pub supervisor: &'a dyn Supervisor,
    pub tracker: &'a HostTracker,
    pub redactor: &'a Redactor,
    pub output: Option<&'a Output>,
}

impl<'a> HostContext<'a> {
    fn sink(&self, stage: StageName) -> StageSink<'a> {
        let sink = StageSink::new(stage, self.redactor).host(self.session.label());
        match self.output {
            Some(output) => sink.echo(output),
            None => sink,
        }
    }
}

/// A host's pipeline, parameterized by how far it has progressed.
pub struct HostPipeline<'a, S> {
    ctx: HostContext<'a>,
    state: S,
}

impl<'a, S> HostPipeline<'a, S> {
    fn transition<T>(self, state: T) -> HostPipeline<'a, T> {
        HostPipeline {
            ctx: self.ctx,
            state,
        }
    }

    /// Run a remote hook stage if one is configured.
    async fn hook(
        &self,
        stage: StageName,
        workdir: &str,
        commit: Option<&str>,
    ) -> Result<(), DeployError> {
        let ctx = &self.ctx;
        let Some(hook) = ctx.environment.hook(stage) else {
            tracing::debug!(host = %ctx.session.label(), "no {} hook configured", stage);
            return Ok(());
        };

        ctx.tracker.enter(stage);
        let context = HookContext::remote(ctx.environment, ctx.host, commit);
        let result = hooks::run_remote(
            hook,
            ctx.session,
            workdir,
            &context,
            ctx.environment.command_timeout,
            ctx.sink(stage),
        )
        .await?;

        match result.enforce(hook.requirement)? {
            StageOutcome::Completed(_) => ctx.tracker.complete(stage),
            StageOutcome::Tolerated { warning, .. } => {
                let message = ctx.redactor.redact(&warning);
                ctx.tracker
                    .warn(Warning::new(WarningKind::OptionalStage, message).at(stage));
                ctx.tracker.leave(stage);
            }
        }
        Ok(())
    }
}

impl<'a> HostPipeline<'a, Connected> {
    pub fn new(ctx: HostContext<'a>) -> Self {
        Self {
            ctx,
            state: Connected,
        }
    }

    /// post-setup, in the target path (created if absent).
    pub async fn setup(self) -> Result<HostPipeline<'a, SetUp>, DeployError> {
        let root = self.ctx.environment.layout.root().to_string();
        self.hook(StageName::PostSetup, &root, None).await?;
        Ok(self.transition(SetUp))
    }
}

impl<'a> HostPipeline<'a, SetUp> {
    pub async fn sync(self) -> Result<HostPipeline<'a, Synced>, DeployError> {
        let ctx = self.ctx;
        let env = ctx.environment;
        ctx.tracker.enter(StageName::Sync);

        let mut sink = ctx.sink(StageName::Sync);
        let revision = sync::sync(
            ctx.session,
            &env.layout,
            &env.repository,
            &env.revision,
            env.command_timeout,
            &mut sink,
        )
        .await?;

        ctx.tracker.synced(&revision);
        ctx.tracker.complete(StageName::Sync);
        Ok(self.transition(Synced { revision }))
    }
}

impl<'a> HostPipeline<'a, Synced> {
    pub async fn materialize(self) -> Result<HostPipeline<'a, Materialized>, DeployError> {
        let ctx = self.ctx;
        let env = ctx.environment;
        ctx.tracker.enter(StageName::MaterializeEnv);

        let mut sink = ctx.sink(StageName::MaterializeEnv);
        let env_file = materialize::materialize(
            ctx.session,
            &env.layout,
            &env.variables,
            env.command_timeout,
            &mut sink,
        )
        .await?;

        tracing::info!(
            host = %ctx.session.label(),
            "wrote {} variable(s) to {}",
            env_file.variables,
            env_file.path
        );
        ctx.tracker.complete(StageName::MaterializeEnv);
        let revision = self.state.revision.clone();
        Ok(self.transition(Materialized { revision, env_file }))
    }

    /// End a setup run here.
    pub fn finish(self) -> RevisionHandle {
        self.state.revision
    }
}

impl<'a> HostPipeline<'a, Materialized> {
    pub fn env_file(&self) -> &materialize::MaterializeOutcome {
        &self.state.env_file
    }

    /// post-deploy, in the `current` symlink.
    pub async fn post_deploy(self) -> Result<HostPipeline<'a, PostDeployed>, DeployError> {
        tracing::debug!(
            host = %self.ctx.session.label(),
            "post-deploy sees {} ({} bytes)",
            self.env_file().path,
            self.env_file().bytes
        );
        let current = self.ctx.environment.layout.current();
        let commit = self.state.revision.commit.clone();
        self.hook(StageName::PostDeploy, &current, Some(&commit))
            .await?;
        let revision = self.state.revision.clone();
        Ok(self.transition(PostDeployed { revision }))
    }
}

impl<'a> HostPipeline<'a, PostDeployed> {
    /// Reload the application and save the process table. Always fatal on failure.
    pub async fn reload(self) -> Result<HostPipeline<'a, Reloaded>, DeployError> {
        let ctx = self.ctx;
        let env = ctx.environment;
        ctx.tracker.enter(StageName::Reload);

        let current = env.layout.current();
        let request = ReloadRequest {
            definition: &env.supervisor.definition,
            environment: &env.name,
            working_dir: &current,
            timeout: env.command_timeout,
        };
        let mut sink = ctx.sink(StageName::Reload);
        ctx.supervisor
            .reload(ctx.session, &request, &mut sink)
            .await?;
        ctx.supervisor
            .persist_state(ctx.session, env.command_timeout, &mut sink)
            .await?;

        ctx.tracker.complete(StageName::Reload);
        let revision = self.state.revision.clone();
        Ok(self.transition(Reloaded { revision }))
    }
}

impl HostPipeline<'_, Reloaded> {
    pub fn finish(self) -> RevisionHandle {
        self.state.revision
    }
}
