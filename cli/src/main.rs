//! tally - top-k item statistics over a paginated REST API.
//!
//! ```text
//! main() -> load config -> RunConfig::resolve -> Orchestrator::run -> render
//!                                                      ^
//!                                    Ctrl-C -> CancelFlag
//! ```
//!
//! The report goes to stdout; logs go to stderr or `--log-file`.

mod render;

use anyhow::{Context, Result};
use clap::Parser;
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tally_engine::{Orchestrator, Overrides, RunConfig, TallyConfig};
use tally_source::{CancelFlag, HttpPageSource};

#[derive(Debug, Parser)]
#[command(name = "tally", version)]
#[command(about = "Report the most frequent items per category of a paginated REST collection")]
struct Cli {
    /// Config file (default: ~/.tally/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Collection URL
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Page size
    #[arg(long)]
    limit: Option<u32>,
    /// Number of concurrent fetch workers
    #[arg(long)]
    workers: Option<usize>,
    /// Items reported per category and overall
    #[arg(long)]
    top_items: Option<usize>,
    /// Categories reported in the category ranking
    #[arg(long)]
    top_categories: Option<usize>,
    /// Item counter capacity (default: top-items x 100)
    #[arg(long)]
    capacity: Option<usize>,
    /// Attempts per page before it is skipped
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            limit: self.limit,
            workers: self.workers,
            top_items: self.top_items,
            top_categories: self.top_categories,
            capacity: self.capacity,
            max_attempts: self.max_attempts,
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %path.display(), "Logging initialized");
        return Ok(());
    }

    // stdout carries the report
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TallyConfig> {
    match path {
        Some(path) => Ok(TallyConfig::load_from(path)?),
        None => Ok(TallyConfig::load()?.unwrap_or_default()),
    }
}

/// First Ctrl-C cancels the run; later ones are ignored while it drains.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(%err, "Ctrl-C handler unavailable");
                return;
            }
            if cancel.cancel() {
                tracing::warn!("Interrupted; finishing in-flight requests");
            } else {
                tracing::debug!("Already cancelling");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let file = load_config(cli.config.as_deref())?;
    let config = RunConfig::resolve(&file, &cli.overrides())?;
    tracing::info!(
        endpoint = %config.endpoint,
        limit = config.limit.get(),
        workers = config.workers.get(),
        "Starting run"
    );

    let source = HttpPageSource::new(config.endpoint.clone(), &config.http)
        .context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(source, &config);
    spawn_interrupt_handler(orchestrator.cancel_flag());

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(%err, "Run failed");
            return Err(err.into());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::TextReport::new(&report, config.aggregator));
    }
    Ok(())
}
