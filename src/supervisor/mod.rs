// ABOUTME: Process supervisor bridge: reload the app definition, persist the process table.
// ABOUTME: Narrow seam so the pipeline never depends on supervisor internals.

mod pm2;

pub use pm2::Pm2;

use async_trait::async_trait;
use std::time::Duration;

use crate::deploy::DeployError;
use crate::transport::{LineSink, RemoteSession};
use crate::types::EnvironmentName;

/// Ask the supervisor to adopt the working copy under a named environment.
#[derive(Debug, Clone, Copy)]
pub struct ReloadRequest<'a> {
    /// Application definition, relative to `working_dir`.
    pub definition: &'a str,
    pub environment: &'a EnvironmentName,
    pub working_dir: &'a str,
    pub timeout: Duration,
}

/// Supervisor operations. Both must be idempotent.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Start the application if absent, otherwise reload it.
    async fn reload(
        &self,
        session: &dyn RemoteSession,
        request: &ReloadRequest<'_>,
        sink: &mut dyn LineSink,
    ) -> Result<(), DeployError>;

    /// Save the process table so it survives a host reboot.
    async fn persist_state(
        &self,
        session: &dyn RemoteSession,
        timeout: Duration,
        sink: &mut dyn LineSink,
    ) -> Result<(), DeployError>;
}
