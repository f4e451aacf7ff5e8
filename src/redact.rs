// ABOUTME: Secret redaction for anything surfaced to the operator.
// ABOUTME: Replaces known secret values in output lines, errors, and reports.

use std::borrow::Cow;

use crate::transport::{LineSink, OutputStream};

/// Replacement text for a redacted secret value.
pub const MASK: &str = "***";

/// Masks a fixed set of secret values.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    // Longest first so a secret that contains another is masked whole.
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = Cow::Owned(out.replace(secret.as_str(), MASK));
            }
        }
        out
    }

    /// Wrap a sink so every line is masked before it reaches `inner`.
    pub fn sink<S: LineSink>(&self, inner: S) -> RedactingSink<'_, S> {
        RedactingSink {
            redactor: self,
            inner,
        }
    }
}

/// A line sink that masks secret values before forwarding.
pub struct RedactingSink<'a, S> {
    redactor: &'a Redactor,
    inner: S,
}

impl<S> RedactingSink<'_, S> {
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LineSink> LineSink for RedactingSink<'_, S> {
    fn line(&mut self, stream: OutputStream, line: &str) {
        let masked = self.redactor.redact(line);
        self.inner.line(stream, &masked);
    }
}
