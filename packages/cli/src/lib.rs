// ABOUTME: Command definitions and process wiring for the autoindex binary
// ABOUTME: Each subcommand opens the store, builds its loop and runs it until Ctrl-C

use anyhow::{Context, Result};
use autoindex_config::{database_url, IndexerSettings, SchedulerSettings};
use autoindex_indexer::{Handler, RunningIndexes, Worker};
use autoindex_sandbox::HostCommandRunner;
use autoindex_scheduler::{LocalGitserverClient, Scheduler};
use autoindex_storage::IndexStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autoindex")]
#[command(about = "Schedules and runs precise code intelligence indexing jobs")]
#[command(version)]
pub struct Cli {
    /// Database URL; overrides AUTOINDEX_DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Periodically enqueue index jobs for eligible repositories
    Scheduler,
    /// Dequeue index jobs and run them in a sandbox
    Indexer,
    /// Apply database migrations and exit
    Migrate,
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Token cancelled on the first Ctrl-C
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            trigger.cancel();
        }
    });
    token
}

pub async fn run(cli: Cli) -> Result<()> {
    let url = cli.database_url.unwrap_or_else(database_url);
    let store = IndexStore::connect(&url)
        .await
        .with_context(|| format!("failed to open index store at {}", url))?;

    match cli.command {
        Commands::Migrate => {
            info!("Migrations applied");
            Ok(())
        }
        Commands::Scheduler => run_scheduler(store).await,
        Commands::Indexer => run_indexer(store).await,
    }
}

async fn run_scheduler(store: IndexStore) -> Result<()> {
    let settings = SchedulerSettings::from_env().context("invalid scheduler configuration")?;
    let gitserver = Arc::new(LocalGitserverClient::new(&settings.repos_root));
    let scheduler = Scheduler::new(store, gitserver, &settings);

    scheduler.run(&shutdown_token()).await;

    let metrics = scheduler.metrics().snapshot();
    info!(
        ticks = metrics.ticks,
        enqueued = metrics.enqueued,
        skipped = metrics.skipped,
        errors = metrics.errors,
        "Scheduler exited"
    );
    Ok(())
}

async fn run_indexer(store: IndexStore) -> Result<()> {
    let settings = IndexerSettings::from_env().context("invalid indexer configuration")?;
    let poll_interval = settings.poll_interval;
    info!(
        firecracker = settings.use_firecracker,
        frontend = %settings.frontend_url,
        "Starting indexer"
    );

    let handler = Handler::new(
        Arc::new(HostCommandRunner::default()),
        Arc::new(RunningIndexes::new()),
        settings,
    );
    Worker::new(store, handler, poll_interval)
        .run(&shutdown_token())
        .await;
    Ok(())
}
