//! Source adapters for the supported content origins.
//!
//! Each adapter wraps one external origin (an arXiv-style paper archive, a
//! Nature-style journal feed, a GitHub-style code host) behind a uniform
//! paging interface. Adapters only translate between the origin's native
//! query mechanism and the crate's item model; batching, dedup, embedding
//! and persistence live in the fetch orchestrator.

pub mod arxiv;
pub mod github;
pub mod nature;
pub mod quality;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Item, SortType, SourceCapabilities, SourceKind};

/// Errors that can occur while talking to an origin.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The adapter cannot be used as configured (e.g. missing credentials).
    /// Fatal at construction time.
    #[error("Source configuration error: {0}")]
    Config(String),

    /// A network or origin-side failure that may succeed on retry. The
    /// orchestrator logs it, keeps what it already has, and moves on.
    #[error("Transient source error: {0}")]
    Transient(String),

    /// The origin returned a payload the adapter cannot interpret.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// One query to run against an origin, in the origin's native terms.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Human-readable label for logs and per-bucket stats
    pub label: String,

    /// The query string in the origin's native syntax
    pub query: String,

    /// Sort order requested from the origin
    pub sort: SortType,

    /// Quota bucket this query accounts against, when backfill quotas apply
    pub bucket: Option<String>,
}

/// A candidate item as produced by a listing page, before hydration.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The natural key the dedup query runs against
    pub natural_key: String,

    /// The item as far as the listing response could populate it
    pub item: Item,
}

/// One page of listing results from an origin.
#[derive(Debug)]
pub struct RawPage {
    /// Candidates on this page, in origin order
    pub candidates: Vec<Candidate>,

    /// Whether the origin indicated more pages exist
    pub has_more: bool,
}

/// The outcome of hydrating a candidate.
#[derive(Debug)]
pub enum Verdict {
    /// The item passed hydration and any quality filtering; commit it
    Keep(Item),

    /// The item was rejected, with the reason for the log line
    Reject(String),
}

/// Trait for content source adapters.
///
/// Listing (`fetch_page`) is cheap and paged; hydration (`hydrate`) may make
/// additional per-item requests (article page, README) and applies any
/// source-specific quality filtering. The orchestrator only hydrates
/// candidates that survived dedup, so per-item request cost is paid for new
/// content only.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short source name used for CLI dispatch and logs (e.g. "arxiv").
    fn name(&self) -> &'static str;

    /// The kind of items this source produces.
    fn kind(&self) -> SourceKind;

    /// Capability descriptor, resolved once at construction.
    fn capabilities(&self) -> &SourceCapabilities;

    /// Queries for an incremental "what's new" run.
    fn queries_new(&self) -> Vec<QuerySpec>;

    /// Queries for a full backfill run.
    fn queries_all(&self) -> Vec<QuerySpec>;

    /// Fetch one listing page for a query. Pages are zero-indexed.
    async fn fetch_page(&self, query: &QuerySpec, page: u32) -> SourceResult<RawPage>;

    /// Hydrate a deduplicated candidate into a committable item, or reject it.
    async fn hydrate(&self, candidate: Candidate) -> SourceResult<Verdict>;

    /// The text to embed for an item, or `None` when the kind is not
    /// embedded at all.
    fn embed_text(&self, item: &Item) -> Option<String>;

    /// Resolve a reserved query literal to its sort order, if `keywords`
    /// is one.
    fn reserved_literal(&self, keywords: &str) -> Option<SortType> {
        self.capabilities().reserved_literal(keywords)
    }
}
