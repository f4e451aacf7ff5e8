// ABOUTME: Immutable deployment environment model.
// ABOUTME: What a run deploys, where, with which hooks and variables.

mod host;
mod layout;
mod stage;
mod variables;

pub use host::Host;
pub use layout::{Layout, LayoutError};
pub use stage::{HookAction, HookStage, Requirement, Site, StageName};
pub use variables::{Variable, Variables};

use nonempty::NonEmpty;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::redact::Redactor;
use crate::types::{EnvironmentName, RevisionRef};

/// Default number of hosts deployed concurrently.
pub const DEFAULT_FANOUT: usize = 4;

/// Default bound on any single remote or local command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// How the process supervisor is asked to adopt a new revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSpec {
    /// Supervisor executable on the host's PATH.
    pub program: String,
    /// Application definition, relative to the working copy.
    pub definition: String,
}

impl Default for SupervisorSpec {
    fn default() -> Self {
        Self {
            program: "pm2".to_string(),
            definition: "ecosystem.config.js".to_string(),
        }
    }
}

/// A named deployment target. Never mutated once a run starts.
#[derive(Debug, Clone)]
pub struct Environment {
    pub name: EnvironmentName,
    pub hosts: NonEmpty<Host>,
    pub repository: String,
    pub revision: RevisionRef,
    pub layout: Layout,
    pub hooks: BTreeMap<StageName, HookStage>,
    pub variables: Variables,
    pub supervisor: SupervisorSpec,
    pub fanout: usize,
    pub command_timeout: Duration,
}

impl Environment {
    pub fn new(
        name: EnvironmentName,
        hosts: NonEmpty<Host>,
        repository: impl Into<String>,
        revision: RevisionRef,
        layout: Layout,
    ) -> Self {
        Self {
            name,
            hosts,
            repository: repository.into(),
            revision,
            layout,
            hooks: BTreeMap::new(),
            variables: Variables::new(),
            supervisor: SupervisorSpec::default(),
            fanout: DEFAULT_FANOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Add or replace the hook for a stage.
    ///
    /// Hooks are only accepted for hook stages; built-in stages are ignored
    /// with a warning.
    pub fn with_hook(mut self, hook: HookStage) -> Self {
        if hook.name.is_hook() {
            self.hooks.insert(hook.name, hook);
        } else {
            tracing::warn!("stage {} does not accept hooks", hook.name);
        }
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(1);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_supervisor(mut self, supervisor: SupervisorSpec) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn hook(&self, stage: StageName) -> Option<&HookStage> {
        self.hooks.get(&stage)
    }

    pub fn redactor(&self) -> Redactor {
        self.variables.redactor()
    }
}
