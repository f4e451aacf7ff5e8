// ABOUTME: Configuration types and parsing for wharf.yml.
// ABOUTME: Handles YAML parsing, operator env resolution, and normalization into Environments.

mod deserialize;
mod env_value;
mod hook;
mod host;
mod init;

pub use env_value::{EnvSpec, EnvValue, OperatorEnv, Resolved};
pub use hook::HookConfig;
pub use host::HostSpec;
pub use init::init_config;

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_FANOUT, Environment, Host, Layout, StageName,
    SupervisorSpec, Variables,
};
use crate::error::{Error, Result};
use crate::ssh::SshOptions;
use crate::types::{EnvironmentName, RevisionRef, VariableName};
use deserialize::{deserialize_hosts, deserialize_strings};

pub const CONFIG_FILENAME: &str = "wharf.yml";
pub const CONFIG_FILENAME_ALT: &str = "wharf.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".wharf/config.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    pub environments: BTreeMap<String, EnvironmentConfig>,

    /// Directory the file was loaded from; relative key paths and local
    /// hooks resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_program")]
    pub program: String,
    #[serde(default = "default_definition")]
    pub definition: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: default_supervisor_program(),
            definition: default_definition(),
        }
    }
}

fn default_supervisor_program() -> String {
    SupervisorSpec::default().program
}

fn default_definition() -> String {
    SupervisorSpec::default().definition
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(deserialize_with = "deserialize_hosts")]
    pub host: NonEmpty<HostSpec>,

    #[serde(default)]
    pub key: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_strings")]
    pub ssh_options: Vec<String>,

    pub repo: String,

    #[serde(rename = "ref")]
    pub revision: String,

    pub path: String,

    #[serde(default, rename = "pre-setup", alias = "pre_setup")]
    pub pre_setup: Option<HookConfig>,

    #[serde(default, rename = "post-setup", alias = "post_setup")]
    pub post_setup: Option<HookConfig>,

    #[serde(default, rename = "pre-deploy-local", alias = "pre_deploy_local")]
    pub pre_deploy_local: Option<HookConfig>,

    #[serde(default, rename = "post-deploy", alias = "post_deploy")]
    pub post_deploy: Option<HookConfig>,

    #[serde(default)]
    pub fanout: Option<usize>,

    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,

    #[serde(default)]
    pub env_file: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = path
            .parent()
            .map(|dir| {
                // .wharf/config.yml belongs to the project above it.
                if dir.ends_with(".wharf") {
                    dir.parent().unwrap_or(dir)
                } else {
                    dir
                }
            })
            .map(Path::to_path_buf);
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// Normalize one environment into the immutable domain model.
    pub fn environment(&self, name: &str, operator: &OperatorEnv) -> Result<Environment> {
        let raw = self
            .environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))?;
        let invalid = |what: String| Error::InvalidConfig(format!("{}: {}", name, what));

        let env_name = EnvironmentName::new(name).map_err(|e| invalid(e.to_string()))?;
        let revision = RevisionRef::parse(&raw.revision).map_err(|e| invalid(e.to_string()))?;
        let mut layout = Layout::new(&raw.path).map_err(|e| invalid(e.to_string()))?;
        if let Some(env_file) = &raw.env_file {
            if env_file.is_empty() || env_file.contains('/') || env_file == "." || env_file == ".." {
                return Err(invalid(format!(
                    "env_file {:?} must be a plain file name",
                    env_file
                )));
            }
            layout = layout.env_file_name(env_file.clone());
        }
        if raw.repo.trim().is_empty() {
            return Err(invalid("repo cannot be empty".to_string()));
        }

        let options =
            SshOptions::parse(&raw.ssh_options).map_err(|e| invalid(e.to_string()))?;
        let key = raw.key.as_ref().map(|k| self.resolve_path(k, operator));

        let hosts = raw
            .host
            .iter()
            .map(|spec| -> Result<Host> {
                let user = spec
                    .user
                    .clone()
                    .or_else(|| raw.user.clone())
                    .or_else(|| operator.get("USER").map(str::to_string))
                    .ok_or_else(|| invalid(format!("no user for host {}", spec.host)))?;
                let mut host = Host::new(&spec.host, user);
                if let Some(port) = spec.port {
                    host = host.port(port);
                }
                if let Some(key) = &key {
                    host = host.key(key.clone());
                }
                Ok(host.with_ssh_options(options.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let hosts = NonEmpty::from_vec(hosts)
            .ok_or_else(|| invalid("at least one host is required".to_string()))?;

        let mut variables = Variables::new();
        for (var, value) in &raw.env {
            let var_name = VariableName::new(var).map_err(|e| invalid(e.to_string()))?;
            let resolved = value.resolve(var, operator)?;
            if resolved.value.contains(['\n', '\r']) {
                return Err(invalid(format!("value of {} contains a newline", var)));
            }
            variables.insert(var_name, resolved.value, resolved.secret);
        }

        let mut environment = Environment::new(env_name, hosts, raw.repo.clone(), revision, layout)
            .with_variables(variables)
            .with_fanout(raw.fanout.unwrap_or(DEFAULT_FANOUT))
            .with_command_timeout(raw.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT))
            .with_supervisor(SupervisorSpec {
                program: self.supervisor.program.clone(),
                definition: self.supervisor.definition.clone(),
            });

        let hooks = [
            (StageName::PreSetup, &raw.pre_setup),
            (StageName::PostSetup, &raw.post_setup),
            (StageName::PreDeployLocal, &raw.pre_deploy_local),
            (StageName::PostDeploy, &raw.post_deploy),
        ];
        for (stage, hook) in hooks {
            if let Some(hook) = hook {
                environment = environment.with_hook(hook.clone().into_stage(stage)?);
            }
        }

        Ok(environment)
    }

    /// Expand `~/` and resolve relative paths against the config directory.
    fn resolve_path(&self, path: &Path, operator: &OperatorEnv) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~")
            && let Some(home) = operator.get("HOME")
        {
            return PathBuf::from(home).join(rest);
        }
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
