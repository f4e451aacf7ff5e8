// ABOUTME: POSIX shell quoting for remote command construction.
// ABOUTME: Every path or user value spliced into a script goes through quote().

use std::borrow::Cow;

/// Quote a value for safe use as a single POSIX shell word.
pub fn quote(value: &str) -> Cow<'_, str> {
    let safe = !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '/' | '.' | '-' | '_' | ':' | '@' | '=' | '+' | ',')
        });
    if safe {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', "'\\''")))
    }
}

/// Render `export KEY=value` statements for a remote shell prelude.
pub fn exports<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    vars.into_iter()
        .map(|(key, value)| format!("export {}={}; ", key, quote(value)))
        .collect()
}
