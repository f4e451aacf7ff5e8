// ABOUTME: Host pipeline state marker types for the type state pattern.
// ABOUTME: Each state carries what the stages so far produced.

use crate::materialize::MaterializeOutcome;
use crate::sync::RevisionHandle;

/// Initial state: session open and lock held.
/// Available actions: `setup()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Connected;

/// post-setup done (or not configured).
/// Available actions: `sync()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SetUp;

/// Working copy at the target commit.
/// Available actions: `materialize()`, `finish()`
#[derive(Debug, Clone)]
pub struct Synced {
    pub(crate) revision: RevisionHandle,
}

/// Env file written.
/// Available actions: `post_deploy()`
#[derive(Debug, Clone)]
pub struct Materialized {
    pub(crate) revision: RevisionHandle,
    pub(crate) env_file: MaterializeOutcome,
}

/// post-deploy done (or not configured).
/// Available actions: `reload()`
#[derive(Debug, Clone)]
pub struct PostDeployed {
    pub(crate) revision: RevisionHandle,
}

/// Supervisor reloaded and process table saved.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Reloaded {
    pub(crate) revision: RevisionHandle,
}
