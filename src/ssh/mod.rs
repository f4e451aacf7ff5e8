// ABOUTME: SSH client for reaching deployment hosts.
// ABOUTME: Agent and key authentication, known_hosts policies, and OpenSSH-style options.

mod client;
mod error;
mod options;

pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
pub use options::{HostKeyPolicy, SshOptions, SshOptionsError};
