// ABOUTME: Hook entries in configuration.
// ABOUTME: A bare string is a required inline command; the detailed form adds script and policy.

use serde::Deserialize;
use std::path::PathBuf;

use crate::environment::{HookAction, HookStage, Requirement, StageName};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HookConfig {
    Command(String),
    Detailed {
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        script: Option<PathBuf>,
        #[serde(default = "default_required")]
        required: bool,
    },
}

fn default_required() -> bool {
    true
}

impl HookConfig {
    pub fn into_stage(self, name: StageName) -> Result<HookStage> {
        let (action, required) = match self {
            HookConfig::Command(command) => (HookAction::Command(command), true),
            HookConfig::Detailed {
                command,
                script,
                required,
            } => match (command, script) {
                (Some(command), None) => (HookAction::Command(command), required),
                (None, Some(script)) => (HookAction::Script(script), required),
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "{} hook needs exactly one of `command` or `script`",
                        name
                    )));
                }
            },
        };
        if let HookAction::Command(command) = &action
            && command.trim().is_empty()
        {
            return Err(Error::InvalidConfig(format!("{} hook is empty", name)));
        }
        Ok(HookStage {
            name,
            action,
            requirement: if required {
                Requirement::Required
            } else {
                Requirement::Optional
            },
        })
    }
}
