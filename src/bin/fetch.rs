//! Fetch pipeline binary entry point.
//!
//! Runs the ingestion pipeline for one source (or all of them): page through
//! the origin, deduplicate, quality-filter, embed and commit.
//!
//! # Examples
//!
//! Incremental fetch from every source:
//! ```bash
//! fetch all
//! ```
//!
//! Historical backfill of the arXiv archive:
//! ```bash
//! fetch arxiv --backfill --max-items 50000
//! ```
//!
//! Periodic monitoring loop:
//! ```bash
//! fetch all --every 3600
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use sciwatch::{
    config::Config,
    embedding::fastembed::{parse_model_name, FastEmbedProvider},
    embedding::EmbeddingProvider,
    fetcher::FetchOptions,
    monitor::Monitor,
    source::{arxiv::ArxivAdapter, github::GithubAdapter, nature::NatureAdapter},
    storage::{sqlite::SqliteStore, ItemStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fetch CLI for ingesting research content into the monitor database
#[derive(Parser, Debug)]
#[command(
    name = "fetch",
    version,
    about = "Fetch new content from the monitored sources",
    long_about = "Ingestion pipeline for the research content monitor.

EXAMPLES:
  Incremental fetch from every source:
    fetch all

  Backfill GitHub repositories:
    GITHUB_TOKEN=ghp_... fetch github --backfill

  Run every hour:
    fetch all --every 3600"
)]
struct FetchArgs {
    /// Source to fetch: arxiv, nature, github, or all
    #[arg(value_name = "SOURCE", default_value = "all")]
    source: String,

    /// Run a historical backfill instead of the incremental fetch
    #[arg(long)]
    backfill: bool,

    /// Overall budget of scanned candidates
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Database file path
    #[arg(long, value_name = "PATH", env = "SCIWATCH_DB", default_value = "sciwatch.db")]
    db_path: PathBuf,

    /// Repeat the fetch every N seconds instead of running once
    #[arg(long, value_name = "SECS")]
    every: Option<u64>,

    /// Embedding model name
    #[arg(long, value_name = "MODEL", env = "SCIWATCH_EMBED_MODEL")]
    embedding_model: Option<String>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn create_provider(args: &FetchArgs, config: &Config) -> Result<FastEmbedProvider> {
    let model_name = args
        .embedding_model
        .clone()
        .unwrap_or_else(|| config.embedding_model.clone());
    let model = parse_model_name(&model_name)
        .with_context(|| format!("Unknown embedding model: {}", model_name))?;

    let cache_dir = config.embedding_cache_dir.clone().or_else(|| {
        dirs::cache_dir().map(|p| p.join("fastembed"))
    });

    let provider = FastEmbedProvider::new(Some(model), cache_dir)
        .context("Failed to initialize embedding provider")?;
    info!(model = provider.model_name(), "embedding provider ready");
    Ok(provider)
}

async fn build_monitor(args: &FetchArgs, config: &Config) -> Result<Monitor> {
    let store = SqliteStore::open(&args.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;
    store
        .initialize()
        .await
        .context("Failed to initialize database schema")?;

    let provider = create_provider(args, config)?;

    let mut monitor = Monitor::new(Arc::new(store), Arc::new(provider));
    monitor.register(Arc::new(ArxivAdapter::new(config.page_size)));
    monitor.register(Arc::new(NatureAdapter::new()));

    match GithubAdapter::new(config.github_token.clone(), None) {
        Ok(adapter) => monitor.register(Arc::new(adapter)),
        Err(e) => {
            if args.source == "github" {
                return Err(anyhow::anyhow!(e)).context("GitHub adapter unavailable");
            }
            warn!(error = %e, "GitHub adapter disabled");
        }
    }

    Ok(monitor)
}

async fn run_once(monitor: &Monitor, args: &FetchArgs) -> Result<bool> {
    let start = Instant::now();
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let mut opts = if args.backfill {
        FetchOptions::backfill()
    } else {
        FetchOptions::recent()
    };
    if let Some(max_items) = args.max_items {
        opts = opts.with_max_items(max_items);
    }

    let any_new = if args.source == "all" {
        let mut any = false;
        for name in monitor.source_names() {
            spinner.set_message(format!("fetching {}", name));
            any |= monitor
                .fetch_with_options(name, args.backfill, &opts)
                .await
                .with_context(|| format!("Fetch failed for source {}", name))?;
        }
        any
    } else {
        spinner.set_message(format!("fetching {}", args.source));
        monitor
            .fetch_with_options(&args.source, args.backfill, &opts)
            .await
            .with_context(|| format!("Fetch failed for source {}", args.source))?
    };

    spinner.finish_and_clear();
    info!(
        elapsed = ?start.elapsed(),
        any_new,
        "fetch run finished"
    );
    Ok(any_new)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = FetchArgs::parse();
    init_logging(&args.log_level);

    let config = Config::from_env();
    info!(source = %args.source, backfill = args.backfill, "starting fetch");

    let monitor = build_monitor(&args, &config).await?;

    match args.every {
        Some(secs) => loop {
            if let Err(e) = run_once(&monitor, &args).await {
                warn!(error = %e, "fetch run failed, will retry on schedule");
            }
            info!(secs, "sleeping until next run");
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        },
        None => {
            let any_new = run_once(&monitor, &args).await?;
            if !any_new {
                info!("no new content found");
            }
            Ok(())
        }
    }
}
