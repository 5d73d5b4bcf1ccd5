//! Source-name dispatch facade.
//!
//! The monitor owns the registered adapters, the store and the embedding
//! provider, and routes fetch and query calls by source name. It is the one
//! type process entry points construct.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::fetcher::{FetchOptions, Fetcher};
use crate::models::{canonical_paper_url, Item, SourceKind};
use crate::query::{QueryError, Retriever, SearchEngine, SearchRequest};
use crate::source::SourceAdapter;
use crate::storage::{ItemStore, StorageError};

/// Default recency window applied when a query carries no `since` bound.
pub const DEFAULT_SINCE_DAYS: i64 = 14;

/// Errors surfaced by the monitor facade.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No adapter is registered under the given name
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A retrieval request failed
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    /// A storage operation failed
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// The top-level facade over adapters, storage and embeddings.
pub struct Monitor {
    store: Arc<dyn ItemStore>,
    provider: Arc<dyn EmbeddingProvider>,
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl Monitor {
    pub fn new(store: Arc<dyn ItemStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            provider,
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    /// Names of the registered sources, for CLI help and "all" fan-out.
    pub fn source_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn adapter(&self, source: &str) -> MonitorResult<&Arc<dyn SourceAdapter>> {
        self.adapters
            .get(source)
            .ok_or_else(|| MonitorError::UnknownSource(source.to_string()))
    }

    /// Retrieve a page of items from one source.
    ///
    /// A request without a `since` bound gets the default recency window so
    /// unbounded queries do not scan the whole table.
    pub async fn get_posts(
        &self,
        source: &str,
        mut request: SearchRequest,
    ) -> MonitorResult<Vec<Item>> {
        let adapter = self.adapter(source)?;
        if request.since.is_none() {
            request.since = Some(Utc::now() - Duration::days(DEFAULT_SINCE_DAYS));
        }
        let retriever = Retriever::new(self.store.as_ref(), self.provider.as_ref());
        let items = retriever
            .search(adapter.kind(), adapter.capabilities(), &request)
            .await?;
        Ok(items)
    }

    /// Retrieve a single item by database id.
    pub async fn get_one_post(&self, source: &str, id: i64) -> MonitorResult<Option<Item>> {
        let adapter = self.adapter(source)?;
        let item = self.store.get_by_id(adapter.kind(), id).await?;
        Ok(item)
    }

    /// Raise the popularity of a stored paper referenced by any of its link
    /// forms (PDF or abstract path, with or without a version suffix).
    ///
    /// # Returns
    /// `true` if a stored paper matched the canonicalized link
    pub async fn bump_paper_popularity(&self, url: &str, delta: i64) -> MonitorResult<bool> {
        let key = canonical_paper_url(url);
        let bumped = self
            .store
            .bump_popularity(SourceKind::Paper, &key, delta)
            .await?;
        Ok(bumped)
    }

    /// Run an incremental fetch for one source, or for every registered
    /// source when `source` is "all".
    ///
    /// # Returns
    /// `true` if any new content was committed
    pub async fn fetch_new(&self, source: &str) -> MonitorResult<bool> {
        self.fetch(source, false).await
    }

    /// Run a backfill fetch for one source, or for every registered source
    /// when `source` is "all".
    pub async fn fetch_all(&self, source: &str) -> MonitorResult<bool> {
        self.fetch(source, true).await
    }

    /// Run a fetch with explicit options for one named source.
    pub async fn fetch_with_options(
        &self,
        source: &str,
        backfill: bool,
        opts: &FetchOptions,
    ) -> MonitorResult<bool> {
        let adapter = self.adapter(source)?;
        let fetcher = Fetcher::new(adapter.as_ref(), self.store.as_ref(), self.provider.as_ref());
        let queries = if backfill {
            adapter.queries_all()
        } else {
            adapter.queries_new()
        };
        let stats = fetcher.run(&queries, opts).await;
        info!(
            source,
            inserted = stats.inserted,
            fetched = stats.fetched,
            "fetch complete"
        );
        Ok(stats.any_new())
    }

    async fn fetch(&self, source: &str, backfill: bool) -> MonitorResult<bool> {
        let opts = if backfill {
            FetchOptions::backfill()
        } else {
            FetchOptions::recent()
        };
        if source == "all" {
            let mut any_new = false;
            for name in self.source_names() {
                any_new |= self.fetch_with_options(name, backfill, &opts).await?;
            }
            return Ok(any_new);
        }
        self.fetch_with_options(source, backfill, &opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingResult;
    use crate::models::{
        PaperItem, SortType, SourceCapabilities, SourceKind,
    };
    use crate::source::{Candidate, QuerySpec, RawPage, SourceResult, Verdict};
    use crate::storage::sqlite::SqliteStore;
    use async_trait::async_trait;

    static TEST_CAPABILITIES: SourceCapabilities = SourceCapabilities {
        supports_vector_search: true,
        searchable_fields: &["title"],
        fresh_literal: "fresh papers",
        hot_literal: "hot papers",
    };

    struct StubProvider;

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Adapter serving one fixed page of two papers.
    struct TinyAdapter;

    #[async_trait]
    impl SourceAdapter for TinyAdapter {
        fn name(&self) -> &'static str {
            "tiny"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Paper
        }
        fn capabilities(&self) -> &SourceCapabilities {
            &TEST_CAPABILITIES
        }
        fn queries_new(&self) -> Vec<QuerySpec> {
            vec![QuerySpec {
                label: "tiny".to_string(),
                query: String::new(),
                sort: SortType::Time,
                bucket: None,
            }]
        }
        fn queries_all(&self) -> Vec<QuerySpec> {
            self.queries_new()
        }
        async fn fetch_page(&self, _query: &QuerySpec, page: u32) -> SourceResult<RawPage> {
            if page > 0 {
                return Ok(RawPage {
                    candidates: Vec::new(),
                    has_more: false,
                });
            }
            let candidates = ["a", "b"]
                .iter()
                .map(|k| Candidate {
                    natural_key: k.to_string(),
                    item: Item::Paper(PaperItem {
                        id: None,
                        url: k.to_string(),
                        version: 1,
                        title: format!("Paper {}", k),
                        abstract_text: "An abstract".to_string(),
                        authors: String::new(),
                        pdf_url: None,
                        journal: None,
                        doi: None,
                        tags: String::new(),
                        published: Utc::now(),
                        popularity: 0,
                        embedding: None,
                    }),
                })
                .collect();
            Ok(RawPage {
                candidates,
                has_more: false,
            })
        }
        async fn hydrate(&self, candidate: Candidate) -> SourceResult<Verdict> {
            Ok(Verdict::Keep(candidate.item))
        }
        fn embed_text(&self, item: &Item) -> Option<String> {
            match item {
                Item::Paper(p) => Some(p.title.clone()),
                _ => None,
            }
        }
    }

    async fn monitor() -> Monitor {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().await.unwrap();
        let mut monitor = Monitor::new(Arc::new(store), Arc::new(StubProvider));
        monitor.register(Arc::new(TinyAdapter));
        monitor
    }

    #[tokio::test]
    async fn test_unknown_source_is_an_error() {
        let monitor = monitor().await;
        let result = monitor.get_posts("nope", SearchRequest::new(None)).await;
        assert!(matches!(result, Err(MonitorError::UnknownSource(_))));
        let result = monitor.fetch_new("nope").await;
        assert!(matches!(result, Err(MonitorError::UnknownSource(_))));
    }

    #[tokio::test]
    async fn test_fetch_then_query_round_trip() {
        let monitor = monitor().await;
        assert!(monitor.fetch_new("tiny").await.unwrap());
        // second run finds nothing new
        assert!(!monitor.fetch_new("tiny").await.unwrap());

        let posts = monitor
            .get_posts("tiny", SearchRequest::new(None))
            .await
            .unwrap();
        assert_eq!(posts.len(), 2);

        let one = monitor.get_one_post("tiny", posts[0].id().unwrap()).await.unwrap();
        assert!(one.is_some());
    }

    #[tokio::test]
    async fn test_all_fans_out_to_every_source() {
        let monitor = monitor().await;
        assert!(monitor.fetch_new("all").await.unwrap());
        assert_eq!(monitor.source_names(), vec!["tiny"]);
    }

    #[tokio::test]
    async fn test_paper_popularity_bump_accepts_any_link_form() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().await.unwrap();
        store
            .insert_batch(&[Item::Paper(PaperItem {
                id: None,
                url: "https://arxiv.org/abs/2401.01234v1".to_string(),
                version: 1,
                title: "Linked".to_string(),
                abstract_text: "An abstract".to_string(),
                authors: String::new(),
                pdf_url: None,
                journal: None,
                doi: None,
                tags: String::new(),
                published: Utc::now(),
                popularity: 0,
                embedding: None,
            })])
            .await
            .unwrap();

        let mut monitor = Monitor::new(Arc::new(store.clone()), Arc::new(StubProvider));
        monitor.register(Arc::new(TinyAdapter));

        // a PDF link from a social post resolves to the stored key
        assert!(monitor
            .bump_paper_popularity("https://arxiv.org/pdf/2401.01234.pdf", 2)
            .await
            .unwrap());
        let item = store
            .get_by_id(SourceKind::Paper, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.popularity_score(), 2);

        // links to unknown papers are a no-op
        assert!(!monitor
            .bump_paper_popularity("https://arxiv.org/pdf/9999.99999.pdf", 2)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_default_since_window_is_applied() {
        let monitor = monitor().await;
        monitor.fetch_new("tiny").await.unwrap();

        // an explicit ancient bound still works
        let old = SearchRequest::new(None)
            .with_since(Utc::now() - Duration::days(3650));
        let posts = monitor.get_posts("tiny", old).await.unwrap();
        assert_eq!(posts.len(), 2);

        // the default window covers freshly fetched items
        let posts = monitor
            .get_posts("tiny", SearchRequest::new(None))
            .await
            .unwrap();
        assert_eq!(posts.len(), 2);
    }
}
