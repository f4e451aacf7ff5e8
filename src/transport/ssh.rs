// ABOUTME: SSH-backed transport built on the russh session client.
// ABOUTME: Maps host definitions to session configs and SSH errors to transport errors.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{CommandStatus, LineSink, RemoteSession, Transport, TransportError};
use crate::environment::Host;
use crate::ssh::{self, Session, SessionConfig};

/// Opens one russh session per host.
#[derive(Debug, Default, Clone)]
pub struct SshTransport {
    home: Option<PathBuf>,
}

impl SshTransport {
    /// `home` is the operator's home directory, searched for default keys.
    pub fn new(home: Option<PathBuf>) -> Self {
        Self { home }
    }

    /// Build the session configuration for a host.
    pub fn session_config(&self, host: &Host) -> SessionConfig {
        let options = host.ssh_options();
        let mut config = SessionConfig::new(&host.address, &host.user)
            .port(host.port)
            .host_key_policy(options.host_key_policy);
        if let Some(home) = &self.home {
            config = config.home(home);
        }
        if let Some(key) = host.key.as_ref().or(options.identity_file.as_ref()) {
            config = config.key_path(key);
        }
        if let Some(path) = &options.known_hosts_file {
            config = config.known_hosts_path(path);
        }
        if let Some(timeout) = options.connect_timeout {
            config = config.connect_timeout(timeout);
        }
        config
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, TransportError> {
        let config = self.session_config(host);
        tracing::debug!(host = %host.label(), port = host.port, "connecting");
        let session = Session::connect(config)
            .await
            .map_err(|e| TransportError::Unreachable {
                host: host.label(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(SshSession {
            label: host.label(),
            session,
        }))
    }
}

struct SshSession {
    label: String,
    session: Session,
}

#[async_trait]
impl RemoteSession for SshSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<CommandStatus, TransportError> {
        let code = self
            .session
            .exec_streaming(script, stdin, sink)
            .await
            .map_err(|e| match e {
                ssh::Error::ChannelClosed => TransportError::ChannelClosed,
                ssh::Error::Io(io) => TransportError::Io(io),
                other if other.is_disconnect() => TransportError::Unreachable {
                    host: self.label.clone(),
                    reason: other.to_string(),
                },
                other => TransportError::Channel(other.to_string()),
            })?;
        Ok(CommandStatus::from_code(code))
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        tracing::debug!(host = %self.label, "disconnecting");
        self.session
            .disconnect()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }
}
