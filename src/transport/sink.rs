// ABOUTME: Line-oriented output sinks for streamed command output.
// ABOUTME: Collect for small control commands, CapturedOutput for bounded stage capture.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives command output one line at a time, as it arrives.
pub trait LineSink: Send {
    fn line(&mut self, stream: OutputStream, line: &str);
}

impl<T: LineSink + ?Sized> LineSink for &mut T {
    fn line(&mut self, stream: OutputStream, line: &str) {
        (**self).line(stream, line);
    }
}

/// Drops every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl LineSink for Discard {
    fn line(&mut self, _stream: OutputStream, _line: &str) {}
}

/// Collects full output of short control commands.
#[derive(Debug, Default, Clone)]
pub struct Collect {
    pub stdout: String,
    pub stderr: String,
}

impl LineSink for Collect {
    fn line(&mut self, stream: OutputStream, line: &str) {
        let buf = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Forwards lines while remembering the last non-empty one per stream.
///
/// Used by built-in stages to attach a short detail to failures without
/// keeping their whole output.
pub struct Tail<'a> {
    inner: &'a mut dyn LineSink,
    last_stdout: Option<String>,
    last_stderr: Option<String>,
}

impl<'a> Tail<'a> {
    pub fn new(inner: &'a mut dyn LineSink) -> Self {
        Self {
            inner,
            last_stdout: None,
            last_stderr: None,
        }
    }

    /// The last stderr line, falling back to stdout.
    pub fn detail(&self) -> Option<&str> {
        self.last_stderr
            .as_deref()
            .or(self.last_stdout.as_deref())
    }
}

impl LineSink for Tail<'_> {
    fn line(&mut self, stream: OutputStream, line: &str) {
        if !line.trim().is_empty() {
            let slot = match stream {
                OutputStream::Stdout => &mut self.last_stdout,
                OutputStream::Stderr => &mut self.last_stderr,
            };
            *slot = Some(line.trim().to_string());
        }
        self.inner.line(stream, line);
    }
}

/// A single captured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Bounded tail of a stage's output.
///
/// Keeps the most recent `limit` lines and counts the rest, so a chatty
/// long-running command cannot grow memory without bound.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    lines: VecDeque<CapturedLine>,
    dropped: usize,
    limit: usize,
}

impl CapturedOutput {
    pub const DEFAULT_LIMIT: usize = 200;

    pub fn with_limit(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            dropped: 0,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, stream: OutputStream, text: impl Into<String>) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(CapturedLine {
            stream,
            text: text.into(),
        });
    }

    pub fn lines(&self) -> impl Iterator<Item = &CapturedLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of older lines discarded to honour the limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The last non-empty stderr line, falling back to stdout.
    pub fn last_error_line(&self) -> Option<&str> {
        let last_on = |stream: OutputStream| {
            self.lines
                .iter()
                .rev()
                .find(|l| l.stream == stream && !l.text.trim().is_empty())
                .map(|l| l.text.trim())
        };
        last_on(OutputStream::Stderr).or_else(|| last_on(OutputStream::Stdout))
    }
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }
}

impl LineSink for CapturedOutput {
    fn line(&mut self, stream: OutputStream, line: &str) {
        self.push(stream, line);
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dropped > 0 {
            writeln!(f, "... {} earlier line(s) omitted", self.dropped)?;
        }
        for line in &self.lines {
            writeln!(f, "{}", line.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_keeps_only_the_tail() {
        let mut capture = CapturedOutput::with_limit(2);
        capture.push(OutputStream::Stdout, "one");
        capture.push(OutputStream::Stdout, "two");
        capture.push(OutputStream::Stdout, "three");

        let texts: Vec<_> = capture.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
        assert_eq!(capture.dropped(), 1);
        assert!(capture.to_string().starts_with("... 1 earlier line(s) omitted"));
    }

    #[test]
    fn last_error_line_prefers_stderr() {
        let mut capture = CapturedOutput::default();
        capture.push(OutputStream::Stderr, "fatal: bad ref");
        capture.push(OutputStream::Stdout, "done");
        capture.push(OutputStream::Stderr, "   ");
        assert_eq!(capture.last_error_line(), Some("fatal: bad ref"));

        let mut quiet = CapturedOutput::default();
        quiet.push(OutputStream::Stdout, "only stdout");
        assert_eq!(quiet.last_error_line(), Some("only stdout"));
    }

    #[test]
    fn tail_forwards_and_keeps_last_line() {
        let mut collect = Collect::default();
        let mut tail = Tail::new(&mut collect);
        tail.line(OutputStream::Stdout, "progress");
        assert_eq!(tail.detail(), Some("progress"));
        tail.line(OutputStream::Stderr, "fatal: no such ref");
        tail.line(OutputStream::Stdout, "cleanup");
        assert_eq!(tail.detail(), Some("fatal: no such ref"));
        drop(tail);
        assert_eq!(collect.stdout, "progress\ncleanup\n");
    }

    #[test]
    fn collect_separates_streams() {
        let mut collect = Collect::default();
        collect.line(OutputStream::Stdout, "a");
        collect.line(OutputStream::Stderr, "b");
        collect.line(OutputStream::Stdout, "c");
        assert_eq!(collect.stdout, "a\nc\n");
        assert_eq!(collect.stderr, "b\n");
    }
}
