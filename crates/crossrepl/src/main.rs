#![warn(missing_docs)]

//! `crossrepld`: the replication syncer daemon and state-inspection CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossrepl::bridge::EventPublisher;
use crossrepl::config::{JobConfig, SyncerConfig};
use crossrepl::registry::{ClusterConnector, JobEndpoints, JobRegistry};
use crossrepl::report;
use crossrepl::store::{FileStateStore, JobStateStore, PersistedJob};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "crossrepld", about = "Cross-cluster replication syncer")]
struct Cli {
    /// Path to the syncer configuration file.
    #[arg(long, default_value = "crossrepl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the syncer: restore persisted jobs and replicate until stopped.
    Serve,
    /// List persisted jobs and their last durable state.
    List,
    /// Register a job from a TOML file; it starts on the next serve.
    AddJob {
        /// Path to the job definition file.
        file: PathBuf,
    },
    /// Remove a persisted job.
    RemoveJob {
        /// Job name.
        name: String,
    },
}

/// Placeholder connector for builds without a linked cluster driver; jobs
/// are parked in error state until one is provided.
struct DriverlessConnector;

#[async_trait::async_trait]
impl ClusterConnector for DriverlessConnector {
    async fn connect(
        &self,
        config: &JobConfig,
        _source_events: EventPublisher,
        _dest_events: EventPublisher,
    ) -> crossrepl::error::Result<JobEndpoints> {
        Err(crossrepl::error::SyncError::Internal {
            msg: format!(
                "no cluster driver available for {} -> {}",
                config.source, config.dest
            ),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        SyncerConfig::from_file(&cli.config)?
    } else {
        tracing::warn!("config file not found, using defaults: {}", cli.config.display());
        SyncerConfig::default()
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::List => list(config).await,
        Command::AddJob { file } => add_job(config, file).await,
        Command::RemoveJob { name } => remove_job(config, name).await,
    }
}

async fn serve(config: SyncerConfig) -> Result<()> {
    tracing::info!("crossrepl syncer starting");
    let store = Arc::new(FileStateStore::open(&config.state_dir)?);
    let registry = Arc::new(JobRegistry::new(
        store,
        Arc::new(DriverlessConnector),
        config.clone(),
    ));

    let started = registry.restore_from_store().await?;
    tracing::info!(jobs = started, "restored persisted jobs");

    let reporter_registry = registry.clone();
    let report_interval = std::time::Duration::from_secs(config.report_interval_secs.max(1));
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_interval);
        loop {
            ticker.tick().await;
            let summaries = reporter_registry.summaries();
            tracing::info!("\n{}", report::render(&summaries));
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested, stopping jobs");
    reporter.abort();
    registry.stop_all().await;
    Ok(())
}

async fn list(config: SyncerConfig) -> Result<()> {
    let store = FileStateStore::open(&config.state_dir)?;
    let jobs = store.load_all().await?;
    let summaries: Vec<_> = jobs
        .iter()
        .map(|j| report::JobSummary {
            name: j.config.name.clone(),
            running: j.state.is_running(),
            state: j.state.clone(),
            progress: format!("watermark={}", j.watermark.committed()),
        })
        .collect();
    println!("{}", report::render(&summaries));
    Ok(())
}

async fn add_job(config: SyncerConfig, file: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("reading job file {}", file.display()))?;
    let job: JobConfig = toml::from_str(&text)?;
    let store = FileStateStore::open(&config.state_dir)?;
    if store.load(&job.name).await?.is_some() {
        anyhow::bail!("job already exists: {}", job.name);
    }
    let name = job.name.clone();
    store.save(&PersistedJob::new(job)).await?;
    println!("job {name} registered; it starts on the next serve");
    Ok(())
}

async fn remove_job(config: SyncerConfig, name: String) -> Result<()> {
    let store = FileStateStore::open(&config.state_dir)?;
    store.remove(&name).await?;
    println!("job {name} removed");
    Ok(())
}
