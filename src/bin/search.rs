//! Search binary entry point.
//!
//! Queries the monitor database built by the fetch binary. Semantic search
//! is used when the source supports it and the index carries embeddings;
//! otherwise the query degrades to keyword matching.
//!
//! # Examples
//!
//! Semantic search over arXiv papers:
//! ```bash
//! search arxiv "contrastive representation learning"
//! ```
//!
//! Most starred repositories of the last month:
//! ```bash
//! search github "hot repos" --since-days 30
//! ```
//!
//! JSON output for scripting:
//! ```bash
//! search nature "protein folding" --format json
//! ```

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use sciwatch::{
    config::Config,
    embedding::fastembed::{parse_model_name, FastEmbedProvider},
    models::{Item, SortType},
    monitor::Monitor,
    query::SearchRequest,
    source::{arxiv::ArxivAdapter, github::GithubAdapter, nature::NatureAdapter},
    storage::{sqlite::SqliteStore, ItemStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly line-oriented listing
    Text,
    /// Machine-readable JSON array
    Json,
}

/// Search CLI for querying the monitor database
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search the monitored sources by meaning, keywords or recency",
    long_about = "Query the monitor database built by the fetch binary.

EXAMPLES:
  Semantic search over papers:
    search arxiv \"contrastive representation learning\"

  Keyword-ranked repositories, hottest first:
    search github rust,async --sort popularity

  Latest items with no query at all:
    search nature --num 10"
)]
struct SearchArgs {
    /// Source to query: arxiv, nature or github
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Query text; omit to list recent items
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Recency window in days
    #[arg(long, value_name = "DAYS")]
    since_days: Option<i64>,

    /// Offset of the first result
    #[arg(long, value_name = "N", default_value = "0")]
    start: usize,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value = "20")]
    num: usize,

    /// Result order: time, popularity or relevance
    #[arg(long, value_name = "ORDER", default_value = "relevance")]
    sort: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Database file path
    #[arg(long, value_name = "PATH", env = "SCIWATCH_DB", default_value = "sciwatch.db")]
    db_path: PathBuf,

    /// Embedding model name
    #[arg(long, value_name = "MODEL", env = "SCIWATCH_EMBED_MODEL")]
    embedding_model: Option<String>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn create_provider(args: &SearchArgs, config: &Config) -> Result<FastEmbedProvider> {
    let model_name = args
        .embedding_model
        .clone()
        .unwrap_or_else(|| config.embedding_model.clone());
    let model = parse_model_name(&model_name)
        .with_context(|| format!("Unknown embedding model: {}", model_name))?;

    let cache_dir = config
        .embedding_cache_dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|p| p.join("fastembed")));

    FastEmbedProvider::new(Some(model), cache_dir)
        .context("Failed to initialize embedding provider")
}

async fn build_monitor(args: &SearchArgs, config: &Config) -> Result<Monitor> {
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

    // Querying only touches the local database, so a missing token never
    // blocks the GitHub source here.
    let token = config
        .github_token
        .clone()
        .unwrap_or_else(|| "local-query-only".to_string());
    match GithubAdapter::new(Some(token), None) {
        Ok(adapter) => monitor.register(Arc::new(adapter)),
        Err(e) => warn!(error = %e, "GitHub adapter disabled"),
    }

    Ok(monitor)
}

fn print_item(rank: usize, item: &Item) {
    match item {
        Item::Paper(p) => {
            println!("{:>3}. {}", rank, p.title);
            let journal = p.journal.as_deref().unwrap_or("arXiv");
            println!(
                "     {} | {} | {}",
                journal,
                p.published.format("%Y-%m-%d"),
                p.url
            );
            if !p.authors.is_empty() {
                println!("     {}", p.authors);
            }
        }
        Item::Repo(r) => {
            println!("{:>3}. {}", rank, r.full_name);
            let language = if r.language.is_empty() { "-" } else { &r.language };
            println!(
                "     {} stars | {} | updated {} | {}",
                r.stars,
                language,
                r.updated_at.format("%Y-%m-%d"),
                r.html_url
            );
            if !r.description.is_empty() {
                println!("     {}", r.description);
            }
        }
        Item::Social(s) => {
            println!("{:>3}. @{}", rank, s.author);
            println!("     {} | +{}", s.published.format("%Y-%m-%d"), s.popularity);
            println!("     {}", s.content);
        }
    }
}

fn print_results(items: &[Item], format: OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (idx, item) in items.iter().enumerate() {
                print_item(idx + 1, item);
            }
            println!("\nFound {} results in {:.2}s", items.len(), elapsed_secs);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items)
                .context("Failed to serialize results to JSON")?;
            println!("{}", json);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = SearchArgs::parse();
    init_logging(&args.log_level);

    if !args.db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Run the fetch binary first to build it.",
            args.db_path.display()
        );
    }

    let config = Config::from_env();
    let monitor = build_monitor(&args, &config).await?;
    info!(db = %args.db_path.display(), "monitor ready");

    let mut request = SearchRequest::new(args.query.clone())
        .with_page(args.start, args.num)
        .with_sort(SortType::parse(&args.sort));
    if let Some(days) = args.since_days {
        request = request.with_since(Utc::now() - Duration::days(days));
    }

    let start = Instant::now();
    let items = monitor
        .get_posts(&args.source, request)
        .await
        .with_context(|| format!("Search failed for source {}", args.source))?;
    let elapsed = start.elapsed();

    print_results(&items, args.format, elapsed.as_secs_f64())
}
