// ABOUTME: Git revision reference parsing.
// ABOUTME: Handles forms like origin/dev, main, v1.2.0, and commit ids.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseRevisionError {
    #[error("revision reference cannot be empty")]
    Empty,

    #[error("invalid character in revision reference: {0:?}")]
    InvalidChar(char),

    #[error("invalid revision reference: {0}")]
    InvalidFormat(String),
}

/// A git reference to deploy.
///
/// `origin/dev` is written the way pm2 configurations spell it: the remote
/// prefix only says which remote the branch comes from. The mirror on each
/// host tracks exactly one remote, so only `name` is used for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRef {
    remote: Option<String>,
    name: String,
}

impl RevisionRef {
    pub fn parse(input: &str) -> Result<Self, ParseRevisionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseRevisionError::Empty);
        }

        if let Some(c) = input.chars().find(|c| {
            !c.is_ascii_alphanumeric() && !matches!(c, '/' | '.' | '-' | '_' | '+')
        }) {
            return Err(ParseRevisionError::InvalidChar(c));
        }

        if input.starts_with('/')
            || input.ends_with('/')
            || input.starts_with('-')
            || input.contains("..")
            || input.contains("//")
        {
            return Err(ParseRevisionError::InvalidFormat(input.to_string()));
        }

        let (remote, name) = match input.split_once('/') {
            Some(("origin", rest)) => (Some("origin".to_string()), rest.to_string()),
            _ => (None, input.to_string()),
        };

        Ok(Self { remote, name })
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    /// Branch, tag, or commit name as known to the mirror.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate refs tried in order when resolving against a mirror.
    pub fn candidates(&self) -> [String; 3] {
        [
            format!("refs/heads/{}", self.name),
            format!("refs/tags/{}", self.name),
            self.name.clone(),
        ]
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote {
            Some(remote) => write!(f, "{}/{}", remote, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
