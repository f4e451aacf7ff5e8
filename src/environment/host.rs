// ABOUTME: Target host definition after config normalization.
// ABOUTME: Carries address, credentials, and parsed SSH options.

use std::path::PathBuf;

use crate::ssh::SshOptions;

/// A host that receives the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub address: String,
    pub port: u16,
    pub user: String,
    /// Private key path; agent and default keys are tried when absent.
    pub key: Option<PathBuf>,
    options: SshOptions,
}

impl Host {
    pub fn new(address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: 22,
            user: user.into(),
            key: None,
            options: SshOptions::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn ssh_options(&self) -> &SshOptions {
        &self.options
    }

    /// Apply SSH options; `Port` and `User` options override the address form.
    pub fn with_ssh_options(mut self, options: SshOptions) -> Self {
        if let Some(port) = options.port {
            self.port = port;
        }
        if let Some(user) = &options.user {
            self.user = user.clone();
        }
        self.options = options;
        self
    }

    /// `user@address`, or `user@address:port` for non-default ports.
    pub fn label(&self) -> String {
        if self.port == 22 {
            format!("{}@{}", self.user, self.address)
        } else {
            format!("{}@{}:{}", self.user, self.address, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_includes_port_only_when_non_default() {
        assert_eq!(Host::new("web1", "deploy").label(), "deploy@web1");
        assert_eq!(
            Host::new("web1", "deploy").port(2222).label(),
            "deploy@web1:2222"
        );
    }

    #[test]
    fn ssh_options_override_port_and_user() {
        let options = SshOptions::parse(["Port=2200", "User=ops"]).unwrap();
        let host = Host::new("web1", "deploy").with_ssh_options(options);
        assert_eq!(host.port, 2200);
        assert_eq!(host.user, "ops");
    }
}
