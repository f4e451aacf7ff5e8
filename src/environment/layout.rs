// ABOUTME: Remote directory layout under an environment's target path.
// ABOUTME: source/ working copy, current symlink, shared/ files, .wharf/ state.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("target path must be absolute: {0:?}")]
    NotAbsolute(String),

    #[error("target path must not be the filesystem root")]
    Root,

    #[error("target path contains an unsupported character: {0:?}")]
    InvalidChar(char),
}

/// Paths used on every host, derived from the target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: String,
    env_file_name: String,
}

impl Layout {
    pub const DEFAULT_ENV_FILE: &'static str = ".envrc";

    pub fn new(target_path: &str) -> Result<Self, LayoutError> {
        let trimmed = target_path.trim_end_matches('/');
        if !target_path.starts_with('/') {
            return Err(LayoutError::NotAbsolute(target_path.to_string()));
        }
        if trimmed.is_empty() {
            return Err(LayoutError::Root);
        }
        if let Some(c) = trimmed.chars().find(|c| c.is_control()) {
            return Err(LayoutError::InvalidChar(c));
        }
        Ok(Self {
            root: trimmed.to_string(),
            env_file_name: Self::DEFAULT_ENV_FILE.to_string(),
        })
    }

    pub fn env_file_name(mut self, name: impl Into<String>) -> Self {
        self.env_file_name = name.into();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Working copy checked out to the deployed revision.
    pub fn source(&self) -> String {
        format!("{}/source", self.root)
    }

    /// Symlink to the working copy that the supervisor runs from.
    pub fn current(&self) -> String {
        format!("{}/current", self.root)
    }

    pub fn shared(&self) -> String {
        format!("{}/shared", self.root)
    }

    pub fn state_dir(&self) -> String {
        format!("{}/.wharf", self.root)
    }

    /// Bare mirror of the repository.
    pub fn cache(&self) -> String {
        format!("{}/repo.git", self.state_dir())
    }

    /// Commit recorded by the last successful sync.
    pub fn revision_marker(&self) -> String {
        format!("{}/revision", self.state_dir())
    }

    /// Commit a sync is moving the working copy to, cleared once recorded.
    pub fn pending_marker(&self) -> String {
        format!("{}/revision.pending", self.state_dir())
    }

    pub fn lock_file(&self) -> String {
        format!("{}/deploy.lock", self.state_dir())
    }

    pub fn env_file(&self) -> String {
        format!("{}/{}", self.shared(), self.env_file_name)
    }

    /// Symlink inside the working copy pointing at the env file.
    pub fn env_link(&self) -> String {
        format!("{}/{}", self.source(), self.env_file_name)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)
    }
}
