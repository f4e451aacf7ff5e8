// ABOUTME: Resolved environment variables with secret marking.
// ABOUTME: Kept sorted by name so rendered env files are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use crate::redact::Redactor;
use crate::types::VariableName;

/// A resolved variable value.
#[derive(Clone, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    pub secret: bool,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.secret {
            crate::redact::MASK
        } else {
            self.value.as_str()
        };
        f.debug_struct("Variable")
            .field("value", &value)
            .field("secret", &self.secret)
            .finish()
    }
}

/// The variables materialized into a host's env file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    entries: BTreeMap<VariableName, Variable>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: VariableName, value: impl Into<String>, secret: bool) {
        self.entries.insert(
            name,
            Variable {
                value: value.into(),
                secret,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariableName, &Variable)> {
        self.entries.iter()
    }

    /// Variables safe to pass to remote shells and logs.
    pub fn public(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.secret)
            .map(|(k, v)| (k.as_str(), v.value.as_str()))
    }

    /// A redactor masking every secret value.
    pub fn redactor(&self) -> Redactor {
        Redactor::new(
            self.entries
                .values()
                .filter(|v| v.secret)
                .map(|v| v.value.clone()),
        )
    }
}
