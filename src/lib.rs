//! sciwatch - a multi-source monitor for research content.
//!
//! This library continuously ingests research papers, code repositories and
//! social posts from external origins, deduplicates them by natural key,
//! enriches them with semantic embeddings, and serves hybrid
//! (vector + keyword + recency/popularity) retrieval queries.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (items, source kinds, sort types)
//! - **embedding**: Text embedding generation and normalization
//! - **storage**: Database persistence and retrieval (SQLite-based)
//! - **source**: Source adapters for the supported origins (arXiv, Nature, GitHub)
//! - **fetcher**: Batched fetch/dedup/commit orchestration
//! - **query**: Hybrid search execution and ranking
//! - **monitor**: Source-name dispatch facade for fetching and querying
//!
//! # Workflow
//!
//! ## Ingestion
//!
//! 1. A source adapter pages through its origin's native query mechanism
//! 2. Raw candidates are batched; one dedup query finds already-known keys
//! 3. New candidates are hydrated, quality-filtered and embedded
//! 4. Each batch is committed in a single transaction
//!
//! ## Search
//!
//! 1. A `since` filter is applied as the base predicate
//! 2. Reserved "fresh"/"hot" queries skip similarity search entirely
//! 3. Otherwise the query is embedded and cosine-distance candidates are
//!    fetched with headroom, then re-ranked by the requested sort
//! 4. On a cold index the engine falls back to keyword substring matching

pub mod config;
pub mod embedding;
pub mod fetcher;
pub mod models;
pub mod monitor;
pub mod query;
pub mod source;
pub mod storage;

pub use embedding::EmbeddingProvider;
pub use models::{Item, PaperItem, RepoItem, SocialItem, SortType, SourceKind};
pub use monitor::Monitor;
pub use query::{Retriever, SearchRequest};
pub use source::SourceAdapter;
pub use storage::ItemStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "AllMiniLML6V2";

/// Default embedding dimension for AllMiniLML6V2
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
