// ABOUTME: Custom serde deserializers for config shapes.
// ABOUTME: Normalizes "single value or list" fields into ordered sequences.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::host::{HostEntry, HostSpec};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// A string or a list of strings.
pub fn deserialize_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(OneOrMany::<String>::deserialize(deserializer)?.into())
}

/// A host entry or a non-empty list of them.
pub fn deserialize_hosts<'de, D>(deserializer: D) -> Result<NonEmpty<HostSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: Vec<HostEntry> = OneOrMany::deserialize(deserializer)?.into();
    let hosts = entries
        .into_iter()
        .map(HostEntry::into_spec)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(hosts).ok_or_else(|| serde::de::Error::custom("at least one host is required"))
}
