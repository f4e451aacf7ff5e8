// ABOUTME: SSH sessions on top of russh: connect, host key policy, authentication, exec.
// ABOUTME: One session per host; commands stream their output line by line.

use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::error::{Error, Result};
use super::options::HostKeyPolicy;
use crate::transport::{LineSink, LineSplitter, OutputStream};

/// Key files tried, in order, when no key is configured.
const DEFAULT_KEYS: [&str; 3] = [".ssh/id_ed25519", ".ssh/id_ecdsa", ".ssh/id_rsa"];

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Explicit private key. When set, nothing else is tried.
    pub key_path: Option<PathBuf>,
    /// Operator home, used to find default keys when there is no agent.
    pub home: Option<PathBuf>,
    pub host_key_policy: HostKeyPolicy,
    /// Overrides `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    /// Bound on TCP connect plus authentication.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            home: None,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Verifies server keys against known_hosts according to the policy.
pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyCheck {
    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!("could not record host key for {}: {}", self.host, e);
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        let accept = match (known, self.policy) {
            (Ok(true), _) => true,
            (_, HostKeyPolicy::AcceptAny) => {
                tracing::debug!(host = %self.host, "host key not verified (StrictHostKeyChecking=no)");
                true
            }
            (Ok(false), HostKeyPolicy::AcceptNew) => {
                tracing::warn!(host = %self.host, "learning new host key");
                self.learn(server_public_key);
                true
            }
            (Err(russh::keys::Error::KeyChanged { .. }), _) => {
                tracing::error!(host = %self.host, "host key differs from known_hosts");
                false
            }
            // Unreadable known_hosts counts as an unknown host.
            (Err(_), HostKeyPolicy::AcceptNew) => true,
            (_, HostKeyPolicy::Strict) => false,
        };
        Ok(accept)
    }
}

/// An established, authenticated SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeyCheck>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.config.addr())
            .field("user", &self.config.user)
            .finish()
    }
}

impl Session {
    /// Connect and authenticate within `config.connect_timeout`.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(config))
            .await
            .map_err(|_| Error::ConnectTimeout(timeout))?
    }

    async fn establish(config: SessionConfig) -> Result<Self> {
        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };
        let check = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_key_policy,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            check,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => Error::HostKeyRejected {
                addr: config.addr(),
                policy: config.host_key_policy.as_str(),
            },
            other => Error::Connect {
                addr: config.addr(),
                reason: other.to_string(),
            },
        })?;

        authenticate(&mut handle, &config).await?;
        tracing::debug!(addr = %config.addr(), user = %config.user, "authenticated");
        Ok(Self { config, handle })
    }

    /// Run `command`, delivering stdout and stderr line by line to `sink`.
    ///
    /// `stdin` is written before EOF is sent. Returns the remote exit status.
    pub async fn exec_streaming(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<u32> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(format!("open: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel(format!("exec: {}", e)))?;
        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| Error::Channel(format!("stdin: {}", e)))?;
        }
        channel
            .eof()
            .await
            .map_err(|e| Error::Channel(format!("eof: {}", e)))?;

        let mut stdout = LineSplitter::new(OutputStream::Stdout);
        let mut stderr = LineSplitter::new(OutputStream::Stderr);
        let mut exit_status = None;
        let mut eof = false;

        // Exit status and EOF may arrive in either order; wait for both.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.push(&data, sink),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.push(&data, sink),
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                    if eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    eof = true;
                    if exit_status.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        stdout.finish(sink);
        stderr.finish(sink);
        exit_status.ok_or(Error::ChannelClosed)
    }

    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Try the configured key, or the agent followed by default keys.
async fn authenticate(handle: &mut Handle<HostKeyCheck>, config: &SessionConfig) -> Result<()> {
    if let Some(path) = &config.key_path {
        let key = load_secret_key(path, None).map_err(|e| Error::KeyLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if with_key(handle, &config.user, key).await? {
            return Ok(());
        }
        return Err(Error::Authentication {
            user: config.user.clone(),
            tried: path.display().to_string(),
        });
    }

    let mut tried = Vec::new();

    match AgentClient::connect_env().await {
        Ok(mut agent) => {
            tried.push("agent".to_string());
            let identities = agent.request_identities().await.unwrap_or_default();
            for identity in identities {
                let accepted = handle
                    .authenticate_publickey_with(&config.user, identity, None, &mut agent)
                    .await
                    .map(|result| result.success())
                    .unwrap_or(false);
                if accepted {
                    return Ok(());
                }
            }
        }
        Err(e) => tracing::debug!("no SSH agent: {}", e),
    }

    if let Some(home) = &config.home {
        for relative in DEFAULT_KEYS {
            let path = home.join(relative);
            let Ok(key) = load_secret_key(&path, None) else {
                continue;
            };
            tried.push(path.display().to_string());
            if with_key(handle, &config.user, key).await? {
                return Ok(());
            }
        }
    }

    Err(Error::Authentication {
        user: config.user.clone(),
        tried: if tried.is_empty() {
            "no agent or keys".to_string()
        } else {
            tried.join(", ")
        },
    })
}

async fn with_key(
    handle: &mut Handle<HostKeyCheck>,
    user: &str,
    key: ssh_key::PrivateKey,
) -> Result<bool> {
    let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
    let result = handle
        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
        .await?;
    Ok(result.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_connection_fields() {
        let config = SessionConfig::new("web1", "deploy")
            .port(2222)
            .key_path("/keys/id")
            .host_key_policy(HostKeyPolicy::Strict)
            .connect_timeout(Duration::from_secs(5));
        assert_eq!(config.addr(), "web1:2222");
        assert_eq!(config.key_path, Some(PathBuf::from("/keys/id")));
        assert_eq!(config.host_key_policy, HostKeyPolicy::Strict);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn defaults_learn_new_hosts() {
        let config = SessionConfig::new("web1", "deploy");
        assert_eq!(config.port, 22);
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptNew);
        assert!(config.home.is_none());
    }
}
