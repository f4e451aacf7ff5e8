// ABOUTME: Environment variable value types with operator-environment references.
// ABOUTME: Handles literal scalars, explicit values, and references with defaults.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Snapshot of the operator's environment, taken once at startup.
///
/// Configuration resolution reads from this instead of the process
/// environment, so resolving is deterministic and testable.
#[derive(Debug, Clone, Default)]
pub struct OperatorEnv {
    vars: BTreeMap<String, String>,
}

impl OperatorEnv {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvSpec {
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Detailed(EnvSpec),
    Literal(serde_yaml::Value),
}

/// A resolved value and whether it must be masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub secret: bool,
}

fn scalar(name: &str, value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(Error::InvalidConfig(format!(
            "env {}: value must be a string, number, or boolean",
            name
        ))),
    }
}

impl EnvValue {
    /// Resolve against the operator environment. `name` is used in errors.
    pub fn resolve(&self, name: &str, operator: &OperatorEnv) -> Result<Resolved> {
        match self {
            EnvValue::Literal(value) => Ok(Resolved {
                value: scalar(name, value)?,
                secret: false,
            }),
            EnvValue::Detailed(spec) => {
                let value = match (&spec.value, &spec.env) {
                    (Some(value), None) => scalar(name, value)?,
                    (None, Some(var)) => match operator.get(var) {
                        Some(val) => val.to_string(),
                        None => match &spec.default {
                            Some(default) => scalar(name, default)?,
                            None => return Err(Error::MissingEnvVar(var.clone())),
                        },
                    },
                    (Some(_), Some(_)) => {
                        return Err(Error::InvalidConfig(format!(
                            "env {}: set either `value` or `env`, not both",
                            name
                        )));
                    }
                    (None, None) => {
                        return Err(Error::InvalidConfig(format!(
                            "env {}: one of `value` or `env` is required",
                            name
                        )));
                    }
                };
                Ok(Resolved {
                    value,
                    secret: spec.secret,
                })
            }
        }
    }
}
