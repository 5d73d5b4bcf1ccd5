//! Environment-backed runtime configuration.
//!
//! Everything here is externally supplied: database path, embedding model,
//! per-source credentials. Missing credentials are not an error at this
//! layer; the adapter that needs them rejects construction instead.

use std::env;
use std::path::PathBuf;

use crate::DEFAULT_EMBEDDING_MODEL;

/// Runtime configuration resolved from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub db_path: PathBuf,

    /// Embedding model name, resolvable by the provider
    pub embedding_model: String,

    /// Optional cache directory for downloaded model files
    pub embedding_cache_dir: Option<PathBuf>,

    /// GitHub API token, required only by the GitHub adapter
    pub github_token: Option<String>,

    /// Listing page size for adapters that page
    pub page_size: Option<usize>,
}

impl Config {
    /// Resolve the configuration from environment variables.
    ///
    /// - `SCIWATCH_DB`: database path (default `sciwatch.db`)
    /// - `SCIWATCH_EMBED_MODEL`: embedding model name
    /// - `SCIWATCH_EMBED_CACHE`: model cache directory
    /// - `GITHUB_TOKEN`: GitHub API token
    /// - `SCIWATCH_PAGE_SIZE`: listing page size
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("SCIWATCH_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sciwatch.db")),
            embedding_model: env::var("SCIWATCH_EMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_cache_dir: env::var("SCIWATCH_EMBED_CACHE").ok().map(PathBuf::from),
            github_token: env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            page_size: env::var("SCIWATCH_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("sciwatch.db"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_cache_dir: None,
            github_token: None,
            page_size: None,
        }
    }
}
