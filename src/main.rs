// ABOUTME: Entry point for the wharf CLI application.
// ABOUTME: Parses arguments, sets up logging and Ctrl-C, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wharf::config::{self, Config, OperatorEnv};
use wharf::deploy::{RunMode, RunOptions};
use wharf::error::{Error, Result};
use wharf::output::{Output, OutputMode};
use wharf::transport::{SshTransport, Transport};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warn, or debug with -v.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    match run(cli, Output::new(mode), cancel).await {
        Ok(()) => {}
        // The report has already been printed.
        Err(Error::RunFailed { .. }) => std::process::exit(1),
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, output: Output, cancel: CancellationToken) -> Result<()> {
    let cwd = env::current_dir()?;
    let load = || match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&cwd),
    };
    let operator = OperatorEnv::from_process();
    let fanout = cli.fanout.map(usize::from);
    let transport: Arc<dyn Transport> =
        Arc::new(SshTransport::new(operator.get("HOME").map(PathBuf::from)));

    match &cli.command {
        Commands::Init { force } => {
            config::init_config(&cwd, *force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::List => {
            commands::list(&load()?, &output);
            Ok(())
        }
        Commands::Setup { environment } => {
            let config = load()?;
            let options = RunOptions {
                fanout,
                force_lock: false,
                workdir: config.base_dir.clone(),
            };
            let environment = config.environment(environment, &operator)?;
            commands::run(transport, environment, RunMode::Setup, options, output, cancel).await
        }
        Commands::Deploy { environment, force } => {
            let config = load()?;
            let options = RunOptions {
                fanout,
                force_lock: *force,
                workdir: config.base_dir.clone(),
            };
            let environment = config.environment(environment, &operator)?;
            commands::run(transport, environment, RunMode::Deploy, options, output, cancel).await
        }
        Commands::Exec {
            environment,
            command,
        } => {
            let environment = load()?.environment(environment, &operator)?;
            commands::exec(transport.as_ref(), &environment, command, fanout, &output, &cancel).await
        }
        Commands::Revision { environment } => {
            let environment = load()?.environment(environment, &operator)?;
            commands::revision(transport.as_ref(), &environment, fanout, &output, &cancel).await
        }
    }
}
