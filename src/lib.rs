// ABOUTME: Library root for wharf - exposes the deployment engine for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod hooks;
pub mod materialize;
pub mod output;
pub mod redact;
pub mod shell;
pub mod ssh;
pub mod supervisor;
pub mod sync;
pub mod transport;
pub mod types;
