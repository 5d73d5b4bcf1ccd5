//! Query processing and ranking module.
//!
//! This module answers retrieval requests against a stored collection. It
//! coordinates between the embedding provider and the storage layer: a
//! request either bypasses similarity search entirely (reserved "fresh"/"hot"
//! literals or no keywords), runs a cosine-distance vector search with
//! headroom for re-ranking, or falls back to keyword substring matching when
//! the index is cold.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{Item, SortType, SourceCapabilities, SourceKind};
use crate::storage::{ItemStore, OrderField};

/// Candidate headroom multiplier: the vector search fetches this many times
/// the requested window so re-ranking and offset pagination stay gapless.
const VECTOR_HEADROOM: usize = 3;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Retrieval request parameters.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text keywords; `None` or a reserved literal skips similarity
    /// search
    pub keywords: Option<String>,

    /// Inclusive lower bound on the item's primary timestamp
    pub since: Option<DateTime<Utc>>,

    /// Pagination offset
    pub start: usize,

    /// Page size
    pub num: usize,

    /// Requested ordering of the final page
    pub sort: SortType,
}

impl SearchRequest {
    pub fn new(keywords: Option<String>) -> Self {
        Self {
            keywords,
            since: None,
            start: 0,
            num: 20,
            sort: SortType::Relevance,
        }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_page(mut self, start: usize, num: usize) -> Self {
        self.start = start;
        self.num = num;
        self
    }

    pub fn with_sort(mut self, sort: SortType) -> Self {
        self.sort = sort;
        self
    }
}

/// Trait for retrieval engines, the seam the monitor facade and the CLI
/// depend on.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a retrieval request over one source kind.
    ///
    /// # Errors
    /// Returns `QueryError` if storage access or query embedding fails
    async fn search(
        &self,
        kind: SourceKind,
        capabilities: &SourceCapabilities,
        request: &SearchRequest,
    ) -> QueryResult<Vec<Item>>;
}

/// Hybrid retrieval engine over a store and an embedding provider.
pub struct Retriever<'a> {
    store: &'a dyn ItemStore,
    provider: &'a dyn EmbeddingProvider,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a dyn ItemStore, provider: &'a dyn EmbeddingProvider) -> Self {
        Self { store, provider }
    }

    /// Plain page ordered by timestamp or popularity, with the popularity
    /// path falling back to time order when the popularity field is sparse.
    async fn plain_page(
        &self,
        kind: SourceKind,
        request: &SearchRequest,
        sort: SortType,
    ) -> QueryResult<Vec<Item>> {
        let page = match sort {
            SortType::Popularity => {
                let page = self
                    .store
                    .popular_page(kind, request.since, request.start, request.num)
                    .await
                    .map_err(|e| QueryError::StorageError(e.to_string()))?;
                if !page.is_empty() {
                    return Ok(page);
                }
                // sparse popularity data must not surprise callers with an
                // empty page
                self.store
                    .recent_page(kind, request.since, request.start, request.num)
                    .await
                    .map_err(|e| QueryError::StorageError(e.to_string()))?
            }
            _ => self
                .store
                .recent_page(kind, request.since, request.start, request.num)
                .await
                .map_err(|e| QueryError::StorageError(e.to_string()))?,
        };
        Ok(page)
    }

    async fn keyword_fallback(
        &self,
        kind: SourceKind,
        request: &SearchRequest,
        keywords: &str,
    ) -> QueryResult<Vec<Item>> {
        let terms: Vec<String> = keywords
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return self.plain_page(kind, request, SortType::Time).await;
        }
        let order = match request.sort {
            SortType::Popularity => OrderField::Popularity,
            _ => OrderField::Timestamp,
        };
        self.store
            .keyword_page(kind, &terms, request.since, request.start, request.num, order)
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))
    }

    async fn vector_search(
        &self,
        kind: SourceKind,
        request: &SearchRequest,
        keywords: &str,
    ) -> QueryResult<Vec<Item>> {
        let normalized = normalize_text(keywords);
        let query_embedding = self
            .provider
            .embed(&normalized)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        // headroom covers both re-ranking and offset pagination
        let limit = VECTOR_HEADROOM * (request.start + request.num);
        let mut scored = self
            .store
            .nearest(kind, &query_embedding, request.since, limit)
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;

        match request.sort {
            SortType::Time => {
                scored.sort_by(|a, b| b.0.timestamp().cmp(&a.0.timestamp()));
            }
            SortType::Popularity => {
                scored.sort_by(|a, b| b.0.popularity_score().cmp(&a.0.popularity_score()));
            }
            // nearest() already returns ascending distance
            SortType::Relevance => {}
        }

        Ok(scored
            .into_iter()
            .map(|(item, _)| item)
            .skip(request.start)
            .take(request.num)
            .collect())
    }
}

#[async_trait]
impl SearchEngine for Retriever<'_> {
    async fn search(
        &self,
        kind: SourceKind,
        capabilities: &SourceCapabilities,
        request: &SearchRequest,
    ) -> QueryResult<Vec<Item>> {
        if request.num == 0 {
            return Ok(Vec::new());
        }

        let keywords = request
            .keywords
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        // no keywords: a plain ordered page
        let Some(keywords) = keywords else {
            let sort = match request.sort {
                SortType::Relevance => SortType::Time,
                other => other,
            };
            return self.plain_page(kind, request, sort).await;
        };

        // reserved literals bypass similarity search entirely
        if let Some(sort) = capabilities.reserved_literal(keywords) {
            debug!(kind = %kind, keywords, "reserved literal query");
            return self.plain_page(kind, request, sort).await;
        }

        let embedded = capabilities.supports_vector_search
            && self
                .store
                .has_embeddings(kind)
                .await
                .map_err(|e| QueryError::StorageError(e.to_string()))?;

        if embedded {
            let results = self.vector_search(kind, request, keywords).await?;
            if !results.is_empty() {
                return Ok(results);
            }
            debug!(kind = %kind, "vector search yielded nothing, trying keywords");
        }

        self.keyword_fallback(kind, request, keywords).await
    }
}
