// ABOUTME: Test support utilities.
// ABOUTME: Git fixtures, a per-host loopback transport, and a recording supervisor.

// Each test binary only uses some of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wharf::deploy::DeployError;
use wharf::environment::{Environment, Host, Layout};
use wharf::supervisor::{ReloadRequest, Supervisor};
use wharf::transport::{
    CommandStatus, LineSink, LocalTransport, RemoteSession, Transport, TransportError,
};
use wharf::types::{EnvironmentName, RevisionRef};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("wharf=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A throwaway upstream repository with a `dev` branch.
pub struct GitRepo {
    dir: TempDir,
}

impl GitRepo {
    pub fn new() -> Self {
        let repo = Self {
            dir: TempDir::new().unwrap(),
        };
        repo.git(&["init", "--quiet", "--initial-branch=dev"]);
        repo.commit("ecosystem.config.js", "module.exports = { apps: [] };\n");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// Commit one file and return the new HEAD.
    pub fn commit(&self, file: &str, content: &str) -> String {
        std::fs::write(self.dir.path().join(file), content).unwrap();
        self.git(&["add", file]);
        self.git(&[
            "-c",
            "user.name=wharf",
            "-c",
            "user.email=wharf@example.com",
            "commit",
            "--quiet",
            "-m",
            file,
        ]);
        self.head()
    }

    pub fn tag(&self, name: &str) {
        self.git(&["tag", name]);
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"]).trim().to_string()
    }

    fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(self.dir.path())
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

/// Run a git command in `dir` and return trimmed stdout.
pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Environment over `hosts`, targeting `<sandbox>/app` on each of them.
pub fn environment(sandbox: &Path, repo: &GitRepo, hosts: &[&str]) -> Environment {
    let hosts: Vec<Host> = hosts.iter().map(|h| Host::new(*h, "deploy")).collect();
    let target = sandbox.join("app");
    Environment::new(
        EnvironmentName::new("dev").unwrap(),
        NonEmpty::from_vec(hosts).unwrap(),
        repo.url(),
        RevisionRef::parse("origin/dev").unwrap(),
        Layout::new(target.to_str().unwrap()).unwrap(),
    )
    .with_command_timeout(Duration::from_secs(30))
}

/// Counters shared by every session of a [`HostRoots`] transport.
#[derive(Debug, Default)]
pub struct SessionStats {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl SessionStats {
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Loopback transport that gives every host its own copy of the target path.
///
/// The environment's target path is rewritten to `<sandbox>/hosts/<address>/app`
/// in every script, so several "hosts" can run on one machine.
pub struct HostRoots {
    target: String,
    sandbox: PathBuf,
    unreachable: HashSet<String>,
    delay: Duration,
    stall_on: Option<String>,
    stats: Arc<SessionStats>,
    scripts: Arc<Mutex<Vec<(String, String)>>>,
}

impl HostRoots {
    pub fn new(sandbox: &Path) -> Self {
        Self {
            target: sandbox.join("app").to_string_lossy().into_owned(),
            sandbox: sandbox.to_path_buf(),
            unreachable: HashSet::new(),
            delay: Duration::ZERO,
            stall_on: None,
            stats: Arc::default(),
            scripts: Arc::default(),
        }
    }

    /// Refuse connections to `address`.
    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    /// Sleep before every command, to keep sessions open longer.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never finish scripts starting with `prefix`, like a dead connection.
    pub fn stall_on(mut self, prefix: &str) -> Self {
        self.stall_on = Some(prefix.to_string());
        self
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Every script run so far, as `(host label, script)`.
    pub fn scripts(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.scripts)
    }

    /// The target path as seen by `address`.
    pub fn root(&self, address: &str) -> PathBuf {
        self.sandbox.join("hosts").join(address).join("app")
    }
}

#[async_trait]
impl Transport for HostRoots {
    async fn connect(&self, host: &Host) -> Result<Box<dyn RemoteSession>, TransportError> {
        if self.unreachable.contains(&host.address) {
            return Err(TransportError::Unreachable {
                host: host.label(),
                reason: "connection refused".to_string(),
            });
        }
        let inner = LocalTransport.connect(host).await?;
        let open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(open, Ordering::SeqCst);
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RootedSession {
            inner,
            target: self.target.clone(),
            root: self.root(&host.address).to_string_lossy().into_owned(),
            delay: self.delay,
            stall_on: self.stall_on.clone(),
            stats: Arc::clone(&self.stats),
            scripts: Arc::clone(&self.scripts),
        }))
    }
}

struct RootedSession {
    inner: Box<dyn RemoteSession>,
    target: String,
    root: String,
    delay: Duration,
    stall_on: Option<String>,
    stats: Arc<SessionStats>,
    scripts: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl RemoteSession for RootedSession {
    fn label(&self) -> &str {
        self.inner.label()
    }

    async fn run(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<CommandStatus, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = script.replace(&self.target, &self.root);
        self.scripts
            .lock()
            .push((self.label().to_string(), script.clone()));
        if let Some(prefix) = &self.stall_on
            && script.starts_with(prefix.as_str())
        {
            std::future::pending::<()>().await;
        }
        self.inner.run(&script, stdin, sink).await
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// One supervisor call as seen by [`RecordingSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    Reload {
        host: String,
        definition: String,
        environment: String,
    },
    Persist {
        host: String,
    },
}

/// Supervisor that records calls instead of running pm2.
#[derive(Default)]
pub struct RecordingSupervisor {
    calls: Mutex<Vec<SupervisorCall>>,
    unavailable_on: Option<String>,
}

impl RecordingSupervisor {
    /// Report the supervisor as missing on hosts whose label contains `host`.
    pub fn unavailable_on(host: &str) -> Self {
        Self {
            calls: Mutex::default(),
            unavailable_on: Some(host.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().clone()
    }

    pub fn reloaded_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SupervisorCall::Reload { host, .. } => Some(host),
                SupervisorCall::Persist { .. } => None,
            })
            .collect();
        hosts.sort();
        hosts
    }
}

#[async_trait]
impl Supervisor for RecordingSupervisor {
    async fn reload(
        &self,
        session: &dyn RemoteSession,
        request: &ReloadRequest<'_>,
        _sink: &mut dyn LineSink,
    ) -> Result<(), DeployError> {
        if let Some(host) = &self.unavailable_on
            && session.label().contains(host.as_str())
        {
            return Err(DeployError::SupervisorUnavailable("pm2 not found".to_string()));
        }
        self.calls.lock().push(SupervisorCall::Reload {
            host: session.label().to_string(),
            definition: request.definition.to_string(),
            environment: request.environment.to_string(),
        });
        Ok(())
    }

    async fn persist_state(
        &self,
        session: &dyn RemoteSession,
        _timeout: Duration,
        _sink: &mut dyn LineSink,
    ) -> Result<(), DeployError> {
        self.calls.lock().push(SupervisorCall::Persist {
            host: session.label().to_string(),
        });
        Ok(())
    }
}
