// ABOUTME: Parsing of OpenSSH-style "Key=Value" options from host definitions.
// ABOUTME: Supports the subset that maps onto the russh client configuration.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SshOptionsError {
    #[error("SSH option {0:?} is not of the form Key=Value")]
    Malformed(String),

    #[error("invalid value {value:?} for SSH option {key}")]
    InvalidValue { key: String, value: String },
}

/// How unknown or changed host keys are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Only hosts already in known_hosts are accepted.
    Strict,
    /// Unknown hosts are learned; changed keys are rejected.
    #[default]
    AcceptNew,
    /// Any key is accepted (`StrictHostKeyChecking=no`).
    AcceptAny,
}

impl HostKeyPolicy {
    /// The `StrictHostKeyChecking` value this policy corresponds to.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "yes",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::AcceptAny => "no",
        }
    }
}

/// Options recognised from a host's `ssh_options`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshOptions {
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_file: Option<PathBuf>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub identity_file: Option<PathBuf>,
}

impl SshOptions {
    /// Parse options such as `StrictHostKeyChecking=no`.
    ///
    /// Keys are case-insensitive, as with OpenSSH. `Key Value` is accepted
    /// too. Options without a russh equivalent are logged and skipped.
    pub fn parse<I, S>(options: I) -> Result<Self, SshOptionsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = SshOptions::default();

        for raw in options {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let (key, value) = raw
                .split_once('=')
                .or_else(|| raw.split_once(char::is_whitespace))
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| SshOptionsError::Malformed(raw.to_string()))?;

            let invalid = || SshOptionsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };

            match key.to_ascii_lowercase().as_str() {
                "stricthostkeychecking" => {
                    parsed.host_key_policy = match value.to_ascii_lowercase().as_str() {
                        "yes" | "ask" => HostKeyPolicy::Strict,
                        "accept-new" => HostKeyPolicy::AcceptNew,
                        "no" | "off" => HostKeyPolicy::AcceptAny,
                        _ => return Err(invalid()),
                    };
                }
                "userknownhostsfile" => parsed.known_hosts_file = Some(PathBuf::from(value)),
                "port" => parsed.port = Some(value.parse().map_err(|_| invalid())?),
                "user" => parsed.user = Some(value.to_string()),
                "connecttimeout" => {
                    let secs: u64 = value.parse().map_err(|_| invalid())?;
                    parsed.connect_timeout = Some(Duration::from_secs(secs));
                }
                "identityfile" => parsed.identity_file = Some(PathBuf::from(value)),
                _ => tracing::warn!("ignoring unsupported SSH option {}", raw),
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_host_key_checking_no_accepts_any_key() {
        let opts = SshOptions::parse(["StrictHostKeyChecking=no"]).unwrap();
        assert_eq!(opts.host_key_policy, HostKeyPolicy::AcceptAny);
        assert_eq!(opts.host_key_policy.as_str(), "no");
    }

    #[test]
    fn default_learns_new_hosts_only() {
        let opts = SshOptions::parse(Vec::<String>::new()).unwrap();
        assert_eq!(opts.host_key_policy, HostKeyPolicy::AcceptNew);
        assert_eq!(opts.host_key_policy.as_str(), "accept-new");
    }

    #[test]
    fn recognised_options_are_parsed() {
        let opts = SshOptions::parse([
            "stricthostkeychecking=yes",
            "Port 2222",
            "ConnectTimeout=7",
            "UserKnownHostsFile=/tmp/known",
            "User=deploy",
            "IdentityFile=/keys/id",
        ])
        .unwrap();
        assert_eq!(opts.host_key_policy, HostKeyPolicy::Strict);
        assert_eq!(opts.port, Some(2222));
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(7)));
        assert_eq!(opts.known_hosts_file, Some(PathBuf::from("/tmp/known")));
        assert_eq!(opts.user.as_deref(), Some("deploy"));
        assert_eq!(opts.identity_file, Some(PathBuf::from("/keys/id")));
    }

    #[test]
    fn unknown_options_are_skipped() {
        let opts = SshOptions::parse(["ForwardAgent=yes"]).unwrap();
        assert_eq!(opts, SshOptions::default());
    }

    #[test]
    fn malformed_values_are_errors() {
        assert_eq!(
            SshOptions::parse(["Compression"]),
            Err(SshOptionsError::Malformed("Compression".to_string()))
        );
        assert!(matches!(
            SshOptions::parse(["Port=abc"]),
            Err(SshOptionsError::InvalidValue { .. })
        ));
        assert!(matches!(
            SshOptions::parse(["StrictHostKeyChecking=maybe"]),
            Err(SshOptionsError::InvalidValue { .. })
        ));
    }
}
