// ABOUTME: Transport-level error types.
// ABOUTME: Connection, timeout, and channel failures independent of the SSH backend.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("host {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel failure: {0}")]
    Channel(String),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the error means the connection itself is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable { .. }
                | TransportError::Channel(_)
                | TransportError::ChannelClosed
        )
    }
}
