// ABOUTME: Integration tests for env file materialization.
// ABOUTME: Atomic replacement under concurrent readers and truncated-stream fault injection.

mod support;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wharf::deploy::ErrorKind;
use wharf::environment::{Host, Layout, Variables};
use wharf::materialize::{self, render};
use wharf::transport::{
    CommandStatus, Discard, LineSink, LocalTransport, RemoteSession, Transport, TransportError,
};
use wharf::types::VariableName;

const TIMEOUT: Duration = Duration::from_secs(30);

fn variables(pairs: &[(&str, &str, bool)]) -> Variables {
    let mut vars = Variables::new();
    for (name, value, secret) in pairs {
        vars.insert(VariableName::new(name).unwrap(), *value, *secret);
    }
    vars
}

fn layout(dir: &TempDir) -> Layout {
    Layout::new(dir.path().join("app").to_str().unwrap()).unwrap()
}

async fn local_session() -> Box<dyn RemoteSession> {
    LocalTransport
        .connect(&Host::new("localhost", "deploy"))
        .await
        .unwrap()
}

/// Forwards to a real session, optionally cutting stdin short and recording scripts.
struct Faulty {
    inner: Box<dyn RemoteSession>,
    truncate_stdin: bool,
    scripts: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteSession for Faulty {
    fn label(&self) -> &str {
        self.inner.label()
    }

    async fn run(
        &self,
        script: &str,
        stdin: Option<&[u8]>,
        sink: &mut dyn LineSink,
    ) -> Result<CommandStatus, TransportError> {
        self.scripts.lock().push(script.to_string());
        let stdin = match stdin {
            Some(input) if self.truncate_stdin => Some(&input[..input.len() / 2]),
            other => other,
        };
        self.inner.run(script, stdin, sink).await
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn writes_private_file_and_links_it_into_the_checkout() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    fs::create_dir_all(layout.source()).unwrap();
    let session = local_session().await;
    let vars = variables(&[("HTTP_PORT", "4000", false), ("DB_DSN", "pg://s3cret", true)]);

    let outcome = materialize::materialize(session.as_ref(), &layout, &vars, TIMEOUT, &mut Discard)
        .await
        .unwrap();

    assert_eq!(outcome.variables, 2);
    let content = fs::read_to_string(layout.env_file()).unwrap();
    assert_eq!(content, "DB_DSN=pg://s3cret\nHTTP_PORT=4000\n");
    assert_eq!(outcome.bytes, content.len());

    let mode = fs::metadata(layout.env_file()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert_eq!(fs::read_to_string(layout.env_link()).unwrap(), content);
    assert!(!std::path::Path::new(&format!("{}.tmp", layout.env_file())).exists());
}

#[tokio::test]
async fn secret_values_only_travel_on_stdin() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    let session = Faulty {
        inner: local_session().await,
        truncate_stdin: false,
        scripts: Mutex::default(),
    };
    let vars = variables(&[("TOKEN", "hunter2-token", true)]);

    materialize::materialize(&session, &layout, &vars, TIMEOUT, &mut Discard)
        .await
        .unwrap();

    let scripts = session.scripts.lock();
    assert!(!scripts.is_empty());
    assert!(scripts.iter().all(|s| !s.contains("hunter2-token")));
}

#[tokio::test]
async fn truncated_stream_keeps_previous_file() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    let session = local_session().await;
    let old = variables(&[("MODE", "old", false)]);
    materialize::materialize(session.as_ref(), &layout, &old, TIMEOUT, &mut Discard)
        .await
        .unwrap();
    let before = fs::read_to_string(layout.env_file()).unwrap();

    let faulty = Faulty {
        inner: session,
        truncate_stdin: true,
        scripts: Mutex::default(),
    };
    let new = variables(&[("MODE", "new-and-much-longer-value", false)]);
    let err = materialize::materialize(&faulty, &layout, &new, TIMEOUT, &mut Discard)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MaterializeFailed);
    assert!(err.to_string().contains("short write"), "{}", err);
    assert_eq!(fs::read_to_string(layout.env_file()).unwrap(), before);
    assert!(!std::path::Path::new(&format!("{}.tmp", layout.env_file())).exists());
}

#[tokio::test]
async fn concurrent_reader_never_sees_a_partial_file() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    let session = local_session().await;

    let payload = "x".repeat(64 * 1024);
    let small = variables(&[("MODE", "a", false)]);
    let large = variables(&[("MODE", "b", false), ("PAYLOAD", payload.as_str(), false)]);
    let expected = [render(&small).unwrap(), render(&large).unwrap()];
    materialize::materialize(session.as_ref(), &layout, &small, TIMEOUT, &mut Discard)
        .await
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = Arc::clone(&done);
        let path = layout.env_file();
        let expected = expected.clone();
        std::thread::spawn(move || {
            let mut reads = 0;
            while !done.load(Ordering::SeqCst) {
                let content = fs::read_to_string(&path).unwrap();
                assert!(
                    expected.contains(&content),
                    "observed partial content of {} bytes",
                    content.len()
                );
                reads += 1;
            }
            reads
        })
    };

    for round in 0..20 {
        let vars = if round % 2 == 0 { &large } else { &small };
        materialize::materialize(session.as_ref(), &layout, vars, TIMEOUT, &mut Discard)
            .await
            .unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let reads = reader.join().unwrap();
    assert!(reads > 0);
}
