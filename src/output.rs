// ABOUTME: Terminal and JSON-lines rendering of run progress and reports.
// ABOUTME: Normal mode is for humans, quiet for CI logs, JSON for scripts.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::{HostStatus, RunReport};
use crate::diagnostics::Warning;
use crate::environment::StageName;
use crate::transport::OutputStream;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages and streamed stage output
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
///
/// Shared between host tasks; every method takes `&self` and writes whole
/// lines so output from concurrent hosts never interleaves mid-line.
#[derive(Debug)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// One streamed line of stage output. `host` is `None` for local stages.
    pub fn stage_line(
        &self,
        host: Option<&str>,
        stage: StageName,
        stream: OutputStream,
        line: &str,
    ) {
        match self.mode {
            OutputMode::Normal => {
                let origin = host.unwrap_or("local");
                match stream {
                    OutputStream::Stdout => println!("[{origin}] {stage} | {line}"),
                    OutputStream::Stderr => eprintln!("[{origin}] {stage} | {line}"),
                }
            }
            OutputMode::Quiet => {}
            OutputMode::Json => {
                let event = LineEvent {
                    event: "line",
                    host,
                    stage: Some(stage),
                    stream,
                    text: line,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    /// One line of ad-hoc command output from a host.
    pub fn host_line(&self, host: &str, stream: OutputStream, line: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => match stream {
                OutputStream::Stdout => println!("[{host}] {line}"),
                OutputStream::Stderr => eprintln!("[{host}] {line}"),
            },
            OutputMode::Json => {
                let event = LineEvent {
                    event: "line",
                    host: Some(host),
                    stage: None,
                    stream,
                    text: line,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    /// The recorded commit of one host.
    pub fn revision(&self, host: &str, commit: Option<&str>) {
        match self.mode {
            OutputMode::Json => {
                let event = RevisionEvent {
                    event: "revision",
                    host,
                    commit,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
            OutputMode::Normal | OutputMode::Quiet => {
                println!("{host}: {}", commit.unwrap_or("not deployed"));
            }
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.json_event("success", message, false),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.json_event("error", message, true),
        }
    }

    /// Print the final run report.
    pub fn report(&self, report: &RunReport) {
        match self.mode {
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&ReportEvent {
                    event: "report",
                    report,
                }) {
                    println!("{json}");
                }
            }
            OutputMode::Normal | OutputMode::Quiet => {
                if let Some(failure) = &report.local_failure {
                    eprintln!(
                        "local {}: {} ({})",
                        failure.stage_label(),
                        failure.message,
                        failure.kind
                    );
                }
                for host in &report.hosts {
                    match host.status {
                        HostStatus::Succeeded => {
                            if self.mode == OutputMode::Normal {
                                let commit = host.commit.as_deref().unwrap_or("-");
                                println!("{}: ok ({})", host.host, short(commit));
                            }
                        }
                        HostStatus::Failed => {
                            if let Some(failure) = &host.failure {
                                eprintln!(
                                    "{}: failed at {}: {} ({})",
                                    host.host,
                                    failure.stage_label(),
                                    failure.message,
                                    failure.kind
                                );
                            }
                        }
                        HostStatus::Pending | HostStatus::Running => {
                            eprintln!("{}: not deployed", host.host);
                        }
                    }
                    if self.mode == OutputMode::Normal {
                        for warning in &host.warnings {
                            eprintln!("{}: {}", host.host, describe(warning));
                        }
                    }
                }
                if self.mode == OutputMode::Normal {
                    for warning in &report.warnings {
                        eprintln!("local: {}", describe(warning));
                    }
                }
                let summary = format!(
                    "{} {}: {}/{} host(s) succeeded",
                    report.mode,
                    report.environment,
                    report.succeeded_hosts(),
                    report.hosts.len()
                );
                if report.succeeded() {
                    self.success(&summary);
                } else {
                    self.error(&summary);
                }
            }
        }
    }

    fn json_event(&self, event: &str, message: &str, to_stderr: bool) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if to_stderr {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }
}

fn describe(warning: &Warning) -> String {
    match warning.stage {
        Some(stage) => format!("warning at {}: {}", stage, warning.message),
        None => format!("warning: {}", warning.message),
    }
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct LineEvent<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<StageName>,
    stream: OutputStream,
    text: &'a str,
}

#[derive(Serialize)]
struct RevisionEvent<'a> {
    event: &'a str,
    host: &'a str,
    commit: Option<&'a str>,
}

#[derive(Serialize)]
struct ReportEvent<'a> {
    event: &'a str,
    #[serde(flatten)]
    report: &'a RunReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;

    #[test]
    fn warnings_name_their_stage() {
        let warning =
            Warning::new(WarningKind::OptionalStage, "exit code 3").at(StageName::PostDeploy);
        assert_eq!(describe(&warning), "warning at post-deploy: exit code 3");

        let warning = Warning::new(WarningKind::LockBroken, "stale");
        assert_eq!(describe(&warning), "warning: stale");
    }

    #[test]
    fn commits_are_shortened_for_display() {
        assert_eq!(short("0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}
