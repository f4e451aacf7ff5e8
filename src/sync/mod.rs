// ABOUTME: Revision synchronizer: brings a host's working copy to a git revision.
// ABOUTME: Mirror cache per host, pure decision step, never re-clones destructively.

mod scripts;

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::deploy::DeployError;
use crate::environment::{Layout, StageName};
use crate::transport::{LineSink, RemoteCommand, RemoteSession, Tail, capture, execute};
use crate::types::RevisionRef;

/// Exit code the resolve script uses when no candidate ref matches.
const NOT_FOUND_EXIT: i32 = 3;

/// What the synchronizer did to the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    /// Fresh working copy cloned from the mirror.
    Create,
    /// Existing working copy moved to a new commit.
    Update,
    /// Working copy already at the commit but never recorded; recorded now.
    Adopt,
    /// Nothing to do.
    UpToDate,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Adopt => "adopt",
            SyncAction::UpToDate => "up-to-date",
        };
        f.write_str(s)
    }
}

/// The commit a host is now at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionHandle {
    pub commit: String,
    pub action: SyncAction,
}

/// Observed state of a host's working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingCopyState {
    pub exists: bool,
    pub head: Option<String>,
    /// Tracked files with uncommitted modifications.
    pub modified: usize,
    /// Commit written by the last successful sync.
    pub recorded: Option<String>,
    /// Commit an unfinished sync was moving to.
    pub pending: Option<String>,
}

impl WorkingCopyState {
    /// Parse the `key=value` report printed by the inspect script.
    pub fn parse(report: &str) -> Result<Self, String> {
        let mut state = WorkingCopyState::default();
        for line in report.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("unexpected inspect output: {:?}", line))?;
            let non_empty = || Some(value.to_string()).filter(|v| !v.is_empty());
            match key {
                "exists" => state.exists = value == "1",
                "head" => state.head = non_empty(),
                "modified" => {
                    state.modified = value
                        .parse()
                        .map_err(|_| format!("bad modified count: {:?}", value))?
                }
                "recorded" => state.recorded = non_empty(),
                "pending" => state.pending = non_empty(),
                _ => tracing::debug!("ignoring inspect key {}", key),
            }
        }
        Ok(state)
    }
}

/// Decide how to reach `target` from `state`.
pub fn decide(state: &WorkingCopyState, target: &str) -> Result<SyncAction, DeployError> {
    if !state.exists {
        return Ok(SyncAction::Create);
    }
    if state.modified > 0 {
        return Err(DeployError::SyncConflict(format!(
            "{} tracked file(s) modified in the working copy",
            state.modified
        )));
    }
    let head = state.head.as_deref().ok_or_else(|| {
        DeployError::SyncConflict("working copy has no checked out commit".to_string())
    })?;

    // A HEAD matching the pending marker was left by an interrupted sync.
    let resumed = state.pending.as_deref() == Some(head);

    match state.recorded.as_deref() {
        Some(recorded) if recorded == head && head == target => Ok(SyncAction::UpToDate),
        Some(recorded) if recorded == head => Ok(SyncAction::Update),
        Some(recorded) if !resumed => Err(DeployError::SyncConflict(format!(
            "working copy is at {} but the last deployed commit was {}",
            short(head),
            short(recorded)
        ))),
        None if !resumed && head != target => Err(DeployError::SyncConflict(format!(
            "existing working copy at {} was not created by wharf",
            short(head)
        ))),
        _ if head == target => Ok(SyncAction::Adopt),
        _ => Ok(SyncAction::Update),
    }
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

/// Bring the host's working copy to `revision`.
pub async fn sync(
    session: &dyn RemoteSession,
    layout: &Layout,
    repository: &str,
    revision: &RevisionRef,
    timeout: Duration,
    sink: &mut dyn LineSink,
) -> Result<RevisionHandle, DeployError> {
    let host = session.label();

    tracing::debug!(host = %host, "updating mirror");
    run_step(session, &scripts::prepare(layout, repository), timeout, sink).await?;

    let commit = resolve(session, layout, revision, timeout).await?;
    tracing::debug!(host = %host, commit = %commit, "resolved {}", revision);

    let report = capture(session, &scripts::inspect(layout), timeout)
        .await
        .map_err(|e| DeployError::from_transport(StageName::Sync, host, e))?;
    if !report.success() {
        return Err(DeployError::command_failed(
            StageName::Sync,
            report.status,
            report.stderr.lines().last(),
        ));
    }
    let state = WorkingCopyState::parse(&report.stdout).map_err(|e| {
        DeployError::command_failed(StageName::Sync, "inspect", Some(&e))
    })?;

    let action = decide(&state, &commit)?;
    tracing::info!(host = %host, commit = %commit, "sync: {}", action);

    match action {
        SyncAction::UpToDate => {}
        SyncAction::Create => {
            run_step(session, &scripts::create(layout, &commit), timeout, sink).await?;
            run_step(session, &scripts::record(layout, &commit), timeout, sink).await?;
        }
        SyncAction::Update => {
            run_step(session, &scripts::update(layout, &commit), timeout, sink).await?;
            run_step(session, &scripts::record(layout, &commit), timeout, sink).await?;
        }
        SyncAction::Adopt => {
            run_step(session, &scripts::record(layout, &commit), timeout, sink).await?;
        }
    }

    Ok(RevisionHandle { commit, action })
}

/// The recorded commit on a host, if any.
pub async fn recorded_commit(
    session: &dyn RemoteSession,
    layout: &Layout,
    timeout: Duration,
) -> Result<Option<String>, DeployError> {
    let output = capture(session, &scripts::read_marker(layout), timeout)
        .await
        .map_err(|e| DeployError::from_transport(StageName::Sync, session.label(), e))?;
    if !output.success() {
        return Err(DeployError::command_failed(
            StageName::Sync,
            output.status,
            output.stderr.lines().last(),
        ));
    }
    Ok(Some(output.stdout.trim().to_string()).filter(|c| !c.is_empty()))
}

async fn resolve(
    session: &dyn RemoteSession,
    layout: &Layout,
    revision: &RevisionRef,
    timeout: Duration,
) -> Result<String, DeployError> {
    let output = capture(session, &scripts::resolve(layout, revision), timeout)
        .await
        .map_err(|e| DeployError::from_transport(StageName::Sync, session.label(), e))?;

    match output.status.code() {
        Some(0) => {}
        Some(NOT_FOUND_EXIT) => return Err(DeployError::RevisionNotFound(revision.to_string())),
        _ => {
            return Err(DeployError::command_failed(
                StageName::Sync,
                output.status,
                output.stderr.lines().last(),
            ));
        }
    }

    let commit = output.stdout.trim();
    if commit.len() < 40 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DeployError::RevisionNotFound(revision.to_string()));
    }
    Ok(commit.to_string())
}

async fn run_step(
    session: &dyn RemoteSession,
    script: &str,
    timeout: Duration,
    sink: &mut dyn LineSink,
) -> Result<(), DeployError> {
    let mut tail = Tail::new(sink);
    let status = execute(session, RemoteCommand::new(script, timeout), &mut tail)
        .await
        .map_err(|e| DeployError::from_transport(StageName::Sync, session.label(), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(DeployError::command_failed(
            StageName::Sync,
            status,
            tail.detail(),
        ))
    }
}
