// ABOUTME: The fixed deployment stage set and user hook definitions.
// ABOUTME: Each stage has a fixed position and execution site; hooks add required/optional.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Every step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    PreSetup,
    PostSetup,
    PreDeployLocal,
    Sync,
    MaterializeEnv,
    PostDeploy,
    Reload,
}

/// Where a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// Once per run, on the operator's machine.
    Local,
    /// Once per host, over the host's session.
    Remote,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        StageName::PreSetup,
        StageName::PostSetup,
        StageName::PreDeployLocal,
        StageName::Sync,
        StageName::MaterializeEnv,
        StageName::PostDeploy,
        StageName::Reload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::PreSetup => "pre-setup",
            StageName::PostSetup => "post-setup",
            StageName::PreDeployLocal => "pre-deploy-local",
            StageName::Sync => "sync",
            StageName::MaterializeEnv => "materialize-env",
            StageName::PostDeploy => "post-deploy",
            StageName::Reload => "reload",
        }
    }

    pub fn site(&self) -> Site {
        match self {
            StageName::PreSetup | StageName::PreDeployLocal => Site::Local,
            _ => Site::Remote,
        }
    }

    /// Whether the stage runs a user-supplied hook rather than built-in work.
    pub fn is_hook(&self) -> bool {
        matches!(
            self,
            StageName::PreSetup
                | StageName::PostSetup
                | StageName::PreDeployLocal
                | StageName::PostDeploy
        )
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Inline shell command.
    Command(String),
    /// Script path: on the operator machine for local stages, on the host for remote ones.
    Script(PathBuf),
}

impl HookAction {
    /// Shell text that performs the action.
    pub fn shell(&self) -> String {
        match self {
            HookAction::Command(cmd) => cmd.clone(),
            HookAction::Script(path) => {
                format!("sh {}", crate::shell::quote(&path.to_string_lossy()))
            }
        }
    }
}

/// Whether a failing hook stops the host's pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    #[default]
    Required,
    Optional,
}

/// A configured hook for one of the hook stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStage {
    pub name: StageName,
    pub action: HookAction,
    pub requirement: Requirement,
}

impl HookStage {
    pub fn required(name: StageName, command: impl Into<String>) -> Self {
        Self {
            name,
            action: HookAction::Command(command.into()),
            requirement: Requirement::Required,
        }
    }

    pub fn optional(name: StageName, command: impl Into<String>) -> Self {
        Self {
            requirement: Requirement::Optional,
            ..Self::required(name, command)
        }
    }

    pub fn site(&self) -> Site {
        self.name.site()
    }
}
