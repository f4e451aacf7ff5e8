// ABOUTME: The `host` field of an environment: one entry or a list.
// ABOUTME: Entries are strings like "user@web1:2222" or maps with explicit fields.

use serde::Deserialize;

/// A host as written in the config, before user and options are applied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    #[serde(alias = "address")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
}

impl HostSpec {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host address cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) => {
                if user.is_empty() {
                    return Err(format!("empty user in {:?}", s));
                }
                (Some(user), rest)
            }
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (host, Some(port))
            }
            None => (rest, None),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(HostSpec {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum HostEntry {
    Simple(String),
    Detailed(HostSpec),
}

impl HostEntry {
    pub(super) fn into_spec(self) -> Result<HostSpec, String> {
        match self {
            HostEntry::Simple(s) => HostSpec::parse(&s),
            HostEntry::Detailed(spec) => Ok(spec),
        }
    }
}
