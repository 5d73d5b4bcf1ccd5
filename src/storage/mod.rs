//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting and retrieving items
//! and their embeddings. One table per source kind; the natural key carries
//! a uniqueness constraint so concurrent flushes cannot double-insert.

pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Item, SourceKind};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Field used to order keyword-search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    /// Primary timestamp, descending
    Timestamp,

    /// Popularity-like field (stars for repositories), descending
    Popularity,
}

/// Compute cosine distance (1 - cosine similarity) between two vectors.
///
/// Smaller is more similar. Mismatched lengths or zero-magnitude vectors
/// yield the maximum distance of 1.0 instead of panicking, so a single
/// degenerate row cannot take down a search.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Trait for item storage backends.
///
/// Write operations group into batch flushes; each `insert_batch` call is
/// one transaction, and the natural-key uniqueness constraint is the
/// backstop against two concurrent flushes deciding the same key is new.
/// Read operations are side-effect free and may run with unlimited
/// concurrency.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// Idempotent and safe to call multiple times.
    async fn initialize(&self) -> StorageResult<()>;

    /// Which of the given natural keys already exist for this kind.
    ///
    /// One call per batch flush; the orchestrator uses the returned set to
    /// decide which candidates are new.
    async fn existing_keys(
        &self,
        kind: SourceKind,
        keys: &[String],
    ) -> StorageResult<HashSet<String>>;

    /// Insert a batch of new items in a single transaction.
    ///
    /// Items whose natural key already exists are silently skipped (the
    /// uniqueness constraint makes the insert a no-op rather than an error).
    ///
    /// # Returns
    /// The number of rows actually inserted
    async fn insert_batch(&self, items: &[Item]) -> StorageResult<usize>;

    /// Refresh the mutable activity fields of an already-known repository.
    ///
    /// Stars only move upward and `updated_at` only moves forward, so
    /// re-fetches never regress what is stored.
    ///
    /// # Returns
    /// `true` if a row was updated
    async fn refresh_repo_activity(
        &self,
        repo_id: &str,
        stars: i64,
        forks: i64,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Get a single item by its database id.
    async fn get_by_id(&self, kind: SourceKind, id: i64) -> StorageResult<Option<Item>>;

    /// A page of items ordered by primary timestamp, newest first.
    async fn recent_page(
        &self,
        kind: SourceKind,
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
    ) -> StorageResult<Vec<Item>>;

    /// A page of items ordered by the popularity-like field, highest first.
    async fn popular_page(
        &self,
        kind: SourceKind,
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
    ) -> StorageResult<Vec<Item>>;

    /// Whether any row of this kind has a non-null embedding.
    async fn has_embeddings(&self, kind: SourceKind) -> StorageResult<bool>;

    /// The `limit` embedded items nearest to `query`, by ascending cosine
    /// distance, restricted to rows passing the `since` filter.
    async fn nearest(
        &self,
        kind: SourceKind,
        query: &[f32],
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<(Item, f32)>>;

    /// Keyword fallback search: every term must match at least one of the
    /// kind's searchable fields (case-insensitive substring), ordered by the
    /// requested field.
    async fn keyword_page(
        &self,
        kind: SourceKind,
        terms: &[String],
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
        order: OrderField,
    ) -> StorageResult<Vec<Item>>;

    /// Total number of rows stored for this kind.
    async fn count(&self, kind: SourceKind) -> StorageResult<usize>;

    /// Raise the popularity counter of the item with the given natural key.
    ///
    /// Negative or zero deltas are ignored; popularity is monotonically
    /// non-decreasing under normal operation.
    ///
    /// # Returns
    /// `true` if a row was updated
    async fn bump_popularity(
        &self,
        kind: SourceKind,
        natural_key: &str,
        delta: i64,
    ) -> StorageResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_basic() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_distance(&a, &[1.0, 0.0, 0.0]) - 0.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &[0.0, 1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_degenerate_inputs() {
        // zero vector and mismatched lengths are maximally distant, not a panic
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
    }
}
