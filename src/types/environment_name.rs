// ABOUTME: Environment name validation.
// ABOUTME: Names are passed to the process supervisor, so they stay shell-safe.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvironmentNameError {
    #[error("environment name cannot be empty")]
    Empty,

    #[error("environment name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("environment name must start with a letter or digit")]
    InvalidStart,

    #[error("invalid character in environment name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentName(String);

impl EnvironmentName {
    pub fn new(value: &str) -> Result<Self, EnvironmentNameError> {
        if value.is_empty() {
            return Err(EnvironmentNameError::Empty);
        }

        if value.len() > 63 {
            return Err(EnvironmentNameError::TooLong);
        }

        if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(EnvironmentNameError::InvalidStart);
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(EnvironmentNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for EnvironmentName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
