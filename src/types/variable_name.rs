// ABOUTME: Environment variable name validation.
// ABOUTME: Accepts POSIX shell identifiers only.

use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VariableNameError {
    #[error("variable name cannot be empty")]
    Empty,

    #[error("variable name cannot start with a digit: {0}")]
    LeadingDigit(String),

    #[error("invalid character '{1}' in variable name {0}")]
    InvalidChar(String, char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableName(String);

impl VariableName {
    pub fn new(value: &str) -> Result<Self, VariableNameError> {
        let Some(first) = value.chars().next() else {
            return Err(VariableNameError::Empty);
        };

        if first.is_ascii_digit() {
            return Err(VariableNameError::LeadingDigit(value.to_string()));
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
        {
            return Err(VariableNameError::InvalidChar(value.to_string(), c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Ordering and hashing match the inner string, so map lookups by &str agree.
impl Borrow<str> for VariableName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
