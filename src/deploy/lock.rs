// ABOUTME: Deploy lock to prevent concurrent runs against the same host directory.
// ABOUTME: Uses atomic noclobber file creation with lock info stored under .wharf/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::environment::Layout;
use crate::shell::quote;
use crate::transport::{RemoteSession, TransportError, capture};
use crate::types::EnvironmentName;

use super::DeployError;

/// A lock older than this is assumed abandoned and may be broken.
const STALE_AFTER_MINUTES: i64 = 60;

/// Contents of `.wharf/deploy.lock`, stored as one JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Operator machine running the deploy.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub environment: String,
}

impl LockInfo {
    /// Describe this process as the lock holder.
    pub fn current(environment: &EnvironmentName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment: environment.to_string(),
        }
    }

    fn unreadable(environment: &EnvironmentName) -> Self {
        Self {
            holder: "unknown".to_string(),
            pid: 0,
            started_at: Utc::now(),
            environment: environment.to_string(),
        }
    }

    pub fn is_stale(&self) -> bool {
        (Utc::now() - self.started_at).num_minutes() >= STALE_AFTER_MINUTES
    }
}

/// A held deploy lock. Must be released explicitly with [`DeployLock::release`].
pub struct DeployLock<'a> {
    session: &'a dyn RemoteSession,
    path: String,
    timeout: Duration,
    broken: Option<LockInfo>,
}

impl std::fmt::Debug for DeployLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("host", &self.session.label())
            .field("path", &self.path)
            .finish()
    }
}

fn lock_error(session: &dyn RemoteSession, context: &str, err: TransportError) -> DeployError {
    if err.is_connection_loss() {
        DeployError::UnreachableHost {
            host: session.label().to_string(),
            reason: err.to_string(),
        }
    } else {
        DeployError::LockFailed(format!("lock {} failed: {}", context, err))
    }
}

impl<'a> DeployLock<'a> {
    /// Take the lock for the environment's target directory.
    ///
    /// Creation goes through `set -C`, so two runs racing for the file cannot
    /// both win. A live lock held by someone else is `LockHeld` unless `force`.
    /// Stale, forced or unparseable locks are removed and reported via
    /// [`DeployLock::broken`].
    pub async fn acquire(
        session: &'a dyn RemoteSession,
        layout: &Layout,
        environment: &EnvironmentName,
        force: bool,
        timeout: Duration,
    ) -> Result<Self, DeployError> {
        let path = layout.lock_file();
        let quoted = quote(&path).into_owned();

        let info = serde_json::to_string(&LockInfo::current(environment))
            .map_err(|e| DeployError::LockFailed(format!("cannot encode lock info: {}", e)))?;
        let create = format!(
            "mkdir -p {} && (set -C; printf '%s\\n' {} > {}) 2>/dev/null",
            quote(&layout.state_dir()),
            quote(&info),
            quoted
        );

        let created = capture(session, &create, timeout)
            .await
            .map_err(|e| lock_error(session, "create", e))?;
        if created.success() {
            return Ok(Self {
                session,
                path,
                timeout,
                broken: None,
            });
        }

        let holder = Self::holder(session, &quoted, timeout).await?;
        if let Some(info) = &holder
            && !force
            && !info.is_stale()
        {
            return Err(DeployError::LockHeld {
                holder: info.holder.clone(),
                pid: info.pid,
                started_at: info.started_at,
            });
        }
        tracing::warn!(
            host = %session.label(),
            holder = holder.as_ref().map(|i| i.holder.as_str()).unwrap_or("unknown"),
            forced = force,
            "breaking deploy lock"
        );

        let retaken = capture(session, &format!("rm -f {} && {}", quoted, create), timeout)
            .await
            .map_err(|e| lock_error(session, "break", e))?;
        if !retaken.success() {
            return Err(DeployError::LockFailed(
                "another run took the lock while it was being broken".to_string(),
            ));
        }

        Ok(Self {
            session,
            path,
            timeout,
            broken: Some(holder.unwrap_or_else(|| LockInfo::unreadable(environment))),
        })
    }

    /// Whoever the lock file names; `None` when it cannot be parsed.
    async fn holder(
        session: &dyn RemoteSession,
        quoted_path: &str,
        timeout: Duration,
    ) -> Result<Option<LockInfo>, DeployError> {
        let output = capture(session, &format!("cat {}", quoted_path), timeout)
            .await
            .map_err(|e| lock_error(session, "read", e))?;
        if !output.success() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<LockInfo>(output.stdout.trim()).ok())
    }

    /// The lock this acquisition broke, if any.
    pub fn broken(&self) -> Option<&LockInfo> {
        self.broken.as_ref()
    }

    /// Shorten the time allowed for release, never lengthen it.
    pub fn cap_timeout(&mut self, limit: Duration) {
        self.timeout = self.timeout.min(limit);
    }

    pub async fn release(self) -> Result<(), DeployError> {
        let output = capture(
            self.session,
            &format!("rm -f {}", quote(&self.path)),
            self.timeout,
        )
        .await
        .map_err(|e| lock_error(self.session, "release", e))?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::LockFailed(format!(
                "failed to remove {}: {}",
                self.path,
                output.stderr.trim()
            )))
        }
    }
}
