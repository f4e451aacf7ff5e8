// ABOUTME: SSH-specific error types.
// ABOUTME: Separates failures before a session exists from failures on an open channel.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("connect and authentication took longer than {0:?}")]
    ConnectTimeout(Duration),

    #[error("host key for {addr} rejected (policy: {policy})")]
    HostKeyRejected { addr: String, policy: &'static str },

    #[error("authentication as {user} failed (tried {tried})")]
    Authentication { user: String, tried: String },

    #[error("failed to load key from {}: {reason}", path.display())]
    KeyLoad { path: PathBuf, reason: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the session can no longer be used.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::ChannelClosed | Error::Protocol(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
