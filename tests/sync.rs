// ABOUTME: Integration tests for the revision synchronizer.
// ABOUTME: Runs the sync scripts against real git repositories through the loopback transport.

mod support;

use std::fs;
use std::time::Duration;
use support::{GitRepo, git_in};
use tempfile::TempDir;
use wharf::deploy::{DeployError, ErrorKind};
use wharf::environment::{Host, Layout};
use wharf::sync::{self, RevisionHandle, SyncAction};
use wharf::transport::{Collect, LocalTransport, RemoteSession, Transport};
use wharf::types::RevisionRef;

const TIMEOUT: Duration = Duration::from_secs(30);

struct Fixture {
    repo: GitRepo,
    _target: TempDir,
    layout: Layout,
    session: Box<dyn RemoteSession>,
}

impl Fixture {
    async fn new() -> Self {
        support::init_tracing();
        let target = TempDir::new().unwrap();
        let layout = Layout::new(target.path().join("app").to_str().unwrap()).unwrap();
        let session = LocalTransport
            .connect(&Host::new("localhost", "deploy"))
            .await
            .unwrap();
        Self {
            repo: GitRepo::new(),
            _target: target,
            layout,
            session,
        }
    }

    async fn sync(&self, revision: &str) -> Result<RevisionHandle, DeployError> {
        let mut sink = Collect::default();
        sync::sync(
            self.session.as_ref(),
            &self.layout,
            &self.repo.url(),
            &RevisionRef::parse(revision).unwrap(),
            TIMEOUT,
            &mut sink,
        )
        .await
    }

    fn source(&self) -> std::path::PathBuf {
        self.layout.source().into()
    }
}

#[tokio::test]
async fn first_sync_creates_working_copy_and_current_link() {
    let fx = Fixture::new().await;

    let handle = fx.sync("origin/dev").await.unwrap();

    assert_eq!(handle.action, SyncAction::Create);
    assert_eq!(handle.commit, fx.repo.head());
    assert_eq!(git_in(&fx.source(), &["rev-parse", "HEAD"]), fx.repo.head());
    assert_eq!(
        fs::read_link(fx.layout.current()).unwrap(),
        std::path::Path::new("source")
    );
    let recorded = sync::recorded_commit(fx.session.as_ref(), &fx.layout, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(recorded.as_deref(), Some(fx.repo.head().as_str()));
}

#[tokio::test]
async fn resync_with_unchanged_ref_is_a_no_op() {
    let fx = Fixture::new().await;
    fx.sync("origin/dev").await.unwrap();

    let marker = fx.layout.revision_marker();
    let before = fs::metadata(&marker).unwrap().modified().unwrap();
    let untracked = fx.source().join("node_modules.txt");
    fs::write(&untracked, "build output").unwrap();

    let handle = fx.sync("origin/dev").await.unwrap();

    assert_eq!(handle.action, SyncAction::UpToDate);
    assert_eq!(fs::metadata(&marker).unwrap().modified().unwrap(), before);
    assert!(untracked.exists(), "untracked files survive a no-op sync");
}

#[tokio::test]
async fn new_commit_updates_in_place() {
    let fx = Fixture::new().await;
    fx.sync("origin/dev").await.unwrap();
    let kept = fx.source().join("uploads");
    fs::create_dir(&kept).unwrap();

    let next = fx.repo.commit("server.js", "console.log('v2');\n");
    let handle = fx.sync("origin/dev").await.unwrap();

    assert_eq!(handle.action, SyncAction::Update);
    assert_eq!(handle.commit, next);
    assert_eq!(git_in(&fx.source(), &["rev-parse", "HEAD"]), next);
    assert!(kept.exists(), "update must not re-clone the working copy");
}

#[tokio::test]
async fn tags_and_commits_resolve() {
    let fx = Fixture::new().await;
    let first = fx.repo.head();
    fx.repo.tag("v1.0.0");
    fx.repo.commit("server.js", "v2\n");

    let handle = fx.sync("v1.0.0").await.unwrap();
    assert_eq!(handle.commit, first);

    let handle = fx.sync(&first).await.unwrap();
    assert_eq!(handle.action, SyncAction::UpToDate);
}

#[tokio::test]
async fn unknown_ref_is_revision_not_found() {
    let fx = Fixture::new().await;

    let err = fx.sync("origin/does-not-exist").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RevisionNotFound);
    assert!(!fx.source().exists());
}

#[tokio::test]
async fn local_modifications_are_a_conflict() {
    let fx = Fixture::new().await;
    fx.sync("origin/dev").await.unwrap();
    fs::write(fx.source().join("ecosystem.config.js"), "hand edited\n").unwrap();
    fx.repo.commit("server.js", "v2\n");

    let err = fx.sync("origin/dev").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SyncConflict);
    let content = fs::read_to_string(fx.source().join("ecosystem.config.js")).unwrap();
    assert_eq!(content, "hand edited\n", "conflicting changes are left untouched");
}

#[tokio::test]
async fn interrupted_update_is_finished_by_the_next_sync() {
    let fx = Fixture::new().await;
    let first = fx.sync("origin/dev").await.unwrap().commit;
    let next = fx.repo.commit("server.js", "console.log('v2');\n");

    // Leave the host the way an update cut off before recording looks.
    let cache = std::path::PathBuf::from(fx.layout.cache());
    git_in(&cache, &["fetch", "--prune", "--quiet", "origin"]);
    git_in(&fx.source(), &["fetch", "--quiet", "origin"]);
    fs::write(fx.layout.pending_marker(), format!("{}\n", next)).unwrap();
    git_in(&fx.source(), &["reset", "--hard", "--quiet", &next]);
    assert_eq!(git_in(&fx.source(), &["rev-parse", "HEAD"]), next);
    let recorded = sync::recorded_commit(fx.session.as_ref(), &fx.layout, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(recorded, Some(first));

    let handle = fx.sync("origin/dev").await.unwrap();

    assert_eq!(handle.action, SyncAction::Adopt);
    assert_eq!(handle.commit, next);
    let recorded = sync::recorded_commit(fx.session.as_ref(), &fx.layout, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(recorded, Some(next));
    assert!(!std::path::Path::new(&fx.layout.pending_marker()).exists());

    let handle = fx.sync("origin/dev").await.unwrap();
    assert_eq!(handle.action, SyncAction::UpToDate);
}

#[tokio::test]
async fn hand_moved_head_is_still_a_conflict() {
    let fx = Fixture::new().await;
    let first = fx.sync("origin/dev").await.unwrap().commit;
    fx.repo.commit("server.js", "v2\n");
    fx.sync("origin/dev").await.unwrap();

    git_in(&fx.source(), &["reset", "--hard", "--quiet", &first]);

    let err = fx.sync("origin/dev").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyncConflict);
}

#[tokio::test]
async fn foreign_working_copy_at_target_is_adopted() {
    let fx = Fixture::new().await;
    fs::create_dir_all(fx.layout.root()).unwrap();
    let status = std::process::Command::new("git")
        .args(["clone", "--quiet", &fx.repo.url(), &fx.layout.source()])
        .status()
        .unwrap();
    assert!(status.success());

    let handle = fx.sync("origin/dev").await.unwrap();

    assert_eq!(handle.action, SyncAction::Adopt);
    let recorded = sync::recorded_commit(fx.session.as_ref(), &fx.layout, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(recorded, Some(fx.repo.head()));
}

#[tokio::test]
async fn revision_is_none_before_first_sync() {
    let fx = Fixture::new().await;
    let recorded = sync::recorded_commit(fx.session.as_ref(), &fx.layout, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(recorded, None);
}
