mod config;
mod error;
mod models;
mod scheduler;
mod source;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;

use scheduler::Scheduler;
use source::http::HttpSourceClient;
use store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(
    name = "nfse-sync",
    version,
    about = "Scheduled NFS-e ingestion for every auto-fetch tenant"
)]
struct Cli {
    #[arg(short, long, env = "NFSE_SYNC_CONFIG", default_value = "~/.nfse-sync/config.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl-C
    Run,
    /// Write a default config and create the database
    Init,
    /// Print the scheduler configuration as JSON
    Status,
    /// Run a single sweep over all eligible tenants
    Sweep,
    /// Fetch one tenant now, regardless of its auto_fetch flag
    Fetch {
        tenant_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            let path = config::init_config_dir().await?;
            let cfg = config::load(&path.to_string_lossy())?;
            SqliteStore::open(&cfg.store.path).with_context(|| {
                format!("Failed to create database: {}", cfg.store.path.display())
            })?;
            tracing::info!("Initialized {}", path.display());
        }
        Commands::Run => run(&cli.config).await?,
        Commands::Status => {
            let scheduler = build(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&scheduler.status())?);
        }
        Commands::Sweep => {
            let scheduler = build(&cli.config)?;
            let summary = scheduler.run_cycle().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Fetch { tenant_id } => {
            let scheduler = build(&cli.config)?;
            let report = scheduler.fetch_tenant_now(tenant_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn build(config_path: &str) -> Result<Scheduler> {
    let cfg = config::load(config_path)?;
    let store = SqliteStore::open(&cfg.store.path)
        .with_context(|| format!("Failed to open database: {}", cfg.store.path.display()))?;
    let source = HttpSourceClient::new(&cfg.source);
    Ok(Scheduler::new(cfg.scheduler, Arc::new(store), Arc::new(source)))
}

async fn run(config_path: &str) -> Result<()> {
    let scheduler = build(config_path)?;
    scheduler.start()?;
    if !scheduler.is_running() {
        tracing::warn!("Scheduler not running (disabled in config); nothing to do");
        return Ok(());
    }

    signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    scheduler.stop().await;
    Ok(())
}
