//! Batched fetch/dedup/commit orchestration.
//!
//! The orchestrator drives one source adapter through its queries and pages,
//! accumulates raw candidates into bounded batches, deduplicates each batch
//! against storage in one call, hydrates and embeds only the new candidates,
//! and commits each batch in a single transaction. Stop conditions are
//! evaluated after every flush.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::models::Item;
use crate::source::{Candidate, QuerySpec, SourceAdapter, SourceError, Verdict};
use crate::storage::ItemStore;

/// Limits and tuning for one fetch invocation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Overall budget of scanned candidates, across all queries
    pub max_items: usize,

    /// Batch size at which an in-memory batch is flushed
    pub batch_size: usize,

    /// Minimum candidates scanned before the empty-flush stop can trigger
    pub min_scanned: usize,

    /// Consecutive zero-new flushes after which a query's pagination stops;
    /// `None` disables the condition (feeds that must be read to the end)
    pub max_empty_flushes: Option<usize>,

    /// Per-bucket minimum counts; when every bucket has reached its quota
    /// the whole invocation stops. Backfill only.
    pub quota: Option<HashMap<String, usize>>,

    /// Courtesy sleep between successful page fetches
    pub page_delay: Duration,
}

impl FetchOptions {
    /// Tuning for the routine incremental run.
    pub fn recent() -> Self {
        Self {
            max_items: 2_000,
            batch_size: 100,
            min_scanned: 100,
            max_empty_flushes: Some(3),
            quota: None,
            page_delay: Duration::from_secs(2),
        }
    }

    /// Tuning for a historical backfill run.
    pub fn backfill() -> Self {
        Self {
            max_items: 100_000,
            batch_size: 100,
            min_scanned: 100,
            max_empty_flushes: None,
            quota: None,
            page_delay: Duration::from_secs(2),
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_quota(mut self, quota: HashMap<String, usize>) -> Self {
        self.quota = Some(quota);
        self
    }
}

/// Counters accumulated over one fetch invocation.
#[derive(Debug, Default, Clone)]
pub struct FetchStats {
    /// Candidates scanned from listing pages
    pub fetched: usize,

    /// Rows newly committed
    pub inserted: usize,

    /// Candidates whose natural key was already stored
    pub duplicates: usize,

    /// Candidates rejected by hydration or the quality filter
    pub filtered: usize,

    /// Candidates dropped by per-item processing errors
    pub failed: usize,

    /// Newly committed rows per quota bucket
    pub per_bucket: HashMap<String, usize>,
}

impl FetchStats {
    /// Whether the invocation added any new content.
    pub fn any_new(&self) -> bool {
        self.inserted > 0
    }
}

/// Drives one adapter's queries to completion against a store and an
/// embedding provider.
pub struct Fetcher<'a> {
    adapter: &'a dyn SourceAdapter,
    store: &'a dyn ItemStore,
    provider: &'a dyn EmbeddingProvider,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        adapter: &'a dyn SourceAdapter,
        store: &'a dyn ItemStore,
        provider: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            adapter,
            store,
            provider,
        }
    }

    /// Run the given queries to completion.
    ///
    /// Transient and per-item errors are logged and absorbed; the returned
    /// stats describe whatever was actually committed. Only configuration
    /// errors surface earlier, at adapter construction.
    pub async fn run(&self, queries: &[QuerySpec], opts: &FetchOptions) -> FetchStats {
        let mut stats = FetchStats::default();
        let mut seen_keys: HashSet<String> = HashSet::new();

        'queries: for query in queries {
            info!(source = self.adapter.name(), query = %query.label, "starting query");
            let mut batch: Vec<Candidate> = Vec::new();
            let mut empty_flushes = 0usize;
            let mut query_scanned = 0usize;
            let mut page = 0u32;

            loop {
                let raw = match self.adapter.fetch_page(query, page).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(
                            source = self.adapter.name(),
                            query = %query.label,
                            error = %e,
                            "abandoning query after fetch error"
                        );
                        // commit what we already have before moving on
                        self.flush(query, &mut batch, &mut stats).await;
                        continue 'queries;
                    }
                };

                let page_len = raw.candidates.len();
                for candidate in raw.candidates {
                    // keys can repeat across pages of overlapping queries
                    if !seen_keys.insert(candidate.natural_key.clone()) {
                        continue;
                    }
                    stats.fetched += 1;
                    query_scanned += 1;
                    batch.push(candidate);

                    // a full batch and an exhausted budget both force a flush,
                    // so the stop set below is evaluated even when the origin
                    // serves pages smaller than the batch size
                    if batch.len() >= opts.batch_size || stats.fetched >= opts.max_items {
                        let new_count = self.flush(query, &mut batch, &mut stats).await;
                        if new_count > 0 {
                            empty_flushes = 0;
                        } else {
                            empty_flushes += 1;
                        }

                        if stats.fetched >= opts.max_items {
                            info!(fetched = stats.fetched, "fetch budget reached");
                            break 'queries;
                        }
                        if let Some(max_empty) = opts.max_empty_flushes {
                            if query_scanned >= opts.min_scanned && empty_flushes >= max_empty {
                                info!(
                                    query = %query.label,
                                    empty_flushes,
                                    "no new items in consecutive batches, stopping query"
                                );
                                continue 'queries;
                            }
                        }
                        if self.quota_satisfied(opts, &stats) {
                            info!("all bucket quotas satisfied");
                            break 'queries;
                        }
                    }
                }

                if !raw.has_more || page_len == 0 {
                    break;
                }
                page += 1;
                tokio::time::sleep(opts.page_delay).await;
            }

            self.flush(query, &mut batch, &mut stats).await;
            if stats.fetched >= opts.max_items {
                info!(fetched = stats.fetched, "fetch budget reached");
                break;
            }
            if self.quota_satisfied(opts, &stats) {
                info!("all bucket quotas satisfied");
                break;
            }
        }

        info!(
            source = self.adapter.name(),
            fetched = stats.fetched,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            filtered = stats.filtered,
            failed = stats.failed,
            "fetch finished"
        );
        stats
    }

    fn quota_satisfied(&self, opts: &FetchOptions, stats: &FetchStats) -> bool {
        let Some(quota) = &opts.quota else {
            return false;
        };
        quota
            .iter()
            .all(|(bucket, min)| stats.per_bucket.get(bucket).copied().unwrap_or(0) >= *min)
    }

    /// Dedup, hydrate, embed and commit one batch. Returns the number of
    /// rows newly inserted.
    async fn flush(
        &self,
        query: &QuerySpec,
        batch: &mut Vec<Candidate>,
        stats: &mut FetchStats,
    ) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let candidates = std::mem::take(batch);
        let kind = self.adapter.kind();

        let keys: Vec<String> = candidates.iter().map(|c| c.natural_key.clone()).collect();
        let known = match self.store.existing_keys(kind, &keys).await {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, "dedup query failed, dropping batch");
                return 0;
            }
        };

        let mut to_commit: Vec<Item> = Vec::new();
        for candidate in candidates {
            if known.contains(&candidate.natural_key) {
                stats.duplicates += 1;
                // duplicates still carry fresher activity data for repos
                if let Item::Repo(r) = &candidate.item {
                    if let Err(e) = self
                        .store
                        .refresh_repo_activity(&r.repo_id, r.stars, r.forks, r.updated_at)
                        .await
                    {
                        warn!(repo = %r.full_name, error = %e, "activity refresh failed");
                    }
                }
                continue;
            }

            match self.adapter.hydrate(candidate).await {
                Ok(Verdict::Keep(item)) => to_commit.push(item),
                Ok(Verdict::Reject(reason)) => {
                    info!(source = self.adapter.name(), reason, "filtered item");
                    stats.filtered += 1;
                }
                Err(SourceError::Config(e)) => {
                    warn!(error = %e, "configuration error during hydration");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "hydration failed, skipping item");
                    stats.failed += 1;
                }
            }
        }

        self.embed_items(&mut to_commit).await;

        match self.store.insert_batch(&to_commit).await {
            Ok(inserted) => {
                if inserted > 0 {
                    info!(
                        source = self.adapter.name(),
                        query = %query.label,
                        inserted,
                        "committed batch"
                    );
                }
                if let Some(bucket) = &query.bucket {
                    *stats.per_bucket.entry(bucket.clone()).or_insert(0) += inserted;
                }
                stats.inserted += inserted;
                inserted
            }
            Err(e) => {
                // previously committed batches stay committed
                warn!(error = %e, "batch commit failed, continuing with next batch");
                0
            }
        }
    }

    /// Populate embeddings in place. Embedding failure degrades the items to
    /// a null embedding instead of dropping them.
    async fn embed_items(&self, items: &mut [Item]) {
        let texts: Vec<(usize, String)> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.adapter.embed_text(item).map(|t| (i, t)))
            .filter(|(_, t)| !t.trim().is_empty())
            .collect();
        if texts.is_empty() {
            return;
        }

        let refs: Vec<&str> = texts.iter().map(|(_, t)| t.as_str()).collect();
        let vectors = match self.provider.embed_batch(&refs).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "batch embedding failed, persisting without embeddings");
                return;
            }
        };

        for ((i, _), vector) in texts.iter().zip(vectors) {
            match &mut items[*i] {
                Item::Paper(p) => p.embedding = Some(vector),
                Item::Repo(r) => r.embedding = Some(vector),
                Item::Social(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::models::{PaperItem, SortType, SourceCapabilities, SourceKind};
    use crate::source::{RawPage, SourceResult};
    use crate::storage::sqlite::SqliteStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    static TEST_CAPABILITIES: SourceCapabilities = SourceCapabilities {
        supports_vector_search: true,
        searchable_fields: &["title"],
        fresh_literal: "fresh papers",
        hot_literal: "hot papers",
    };

    fn paper_candidate(key: &str) -> Candidate {
        Candidate {
            natural_key: key.to_string(),
            item: Item::Paper(PaperItem {
                id: None,
                url: key.to_string(),
                version: 1,
                title: format!("Paper {}", key),
                abstract_text: "An abstract".to_string(),
                authors: "A. Author".to_string(),
                pdf_url: None,
                journal: None,
                doi: None,
                tags: String::new(),
                published: Utc::now(),
                popularity: 0,
                embedding: None,
            }),
        }
    }

    /// Adapter serving a scripted sequence of pages.
    struct ScriptedAdapter {
        pages: Mutex<Vec<SourceResult<RawPage>>>,
        pages_served: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(pages: Vec<SourceResult<RawPage>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                pages_served: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Paper
        }
        fn capabilities(&self) -> &SourceCapabilities {
            &TEST_CAPABILITIES
        }
        fn queries_new(&self) -> Vec<QuerySpec> {
            vec![QuerySpec {
                label: "scripted".to_string(),
                query: String::new(),
                sort: SortType::Time,
                bucket: None,
            }]
        }
        fn queries_all(&self) -> Vec<QuerySpec> {
            self.queries_new()
        }
        async fn fetch_page(&self, _query: &QuerySpec, _page: u32) -> SourceResult<RawPage> {
            self.pages_served.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(RawPage {
                    candidates: Vec::new(),
                    has_more: false,
                })
            } else {
                pages.remove(0)
            }
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

    /// Provider returning a constant vector, or failing on demand.
    struct StubProvider {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.fail {
                return Err(EmbeddingError::ModelError("stub failure".to_string()));
            }
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            if self.fail {
                return Err(EmbeddingError::ModelError("stub failure".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn page_of(keys: &[&str], has_more: bool) -> SourceResult<RawPage> {
        Ok(RawPage {
            candidates: keys.iter().map(|k| paper_candidate(k)).collect(),
            has_more,
        })
    }

    fn fast_options() -> FetchOptions {
        FetchOptions {
            page_delay: Duration::from_millis(0),
            batch_size: 2,
            ..FetchOptions::recent()
        }
    }

    async fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_fetch_commits_new_items_with_embeddings() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        let adapter = ScriptedAdapter::new(vec![page_of(&["a", "b", "c"], false)]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);

        let stats = fetcher.run(&adapter.queries_new(), &fast_options()).await;
        assert_eq!(stats.inserted, 3);
        assert!(stats.any_new());
        assert!(store.has_embeddings(SourceKind::Paper).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        let adapter = ScriptedAdapter::new(vec![page_of(&["a", "b"], false)]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);
        let stats = fetcher.run(&adapter.queries_new(), &fast_options()).await;
        assert_eq!(stats.inserted, 2);

        // the origin serves the same content again
        let adapter = ScriptedAdapter::new(vec![page_of(&["a", "b"], false)]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);
        let stats = fetcher.run(&adapter.queries_new(), &fast_options()).await;
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.duplicates, 2);
        assert!(!stats.any_new());
        assert_eq!(store.count(SourceKind::Paper).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_in_batch_duplicate_keys_yield_one_row() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        // the same key appears twice on one page and once on the next
        let adapter = ScriptedAdapter::new(vec![
            page_of(&["a", "a"], true),
            page_of(&["a", "b"], false),
        ]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);
        fetcher.run(&adapter.queries_new(), &fast_options()).await;
        assert_eq!(store.count(SourceKind::Paper).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stops_after_consecutive_empty_flushes() {
        let store = store().await;
        let provider = StubProvider { fail: false };

        // preload the store with everything the origin will serve
        let preload: Vec<Item> = (0..200)
            .map(|i| paper_candidate(&format!("k{}", i)).item)
            .collect();
        store.insert_batch(&preload).await.unwrap();

        // 100 pages of already-known keys, far more than the stop condition
        // should allow to be scanned
        let pages: Vec<SourceResult<RawPage>> = (0..100)
            .map(|p| {
                let keys: Vec<String> = (0..2).map(|i| format!("k{}", p * 2 + i)).collect();
                let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
                page_of(&refs, true)
            })
            .collect();
        let adapter = ScriptedAdapter::new(pages);
        let fetcher = Fetcher::new(&adapter, &store, &provider);

        let mut opts = fast_options();
        opts.min_scanned = 10;
        opts.max_empty_flushes = Some(3);
        let stats = fetcher.run(&adapter.queries_new(), &opts).await;

        assert_eq!(stats.inserted, 0);
        // stopped well before the origin ran out of pages
        assert!(adapter.pages_served.load(Ordering::SeqCst) < 50);
    }

    #[tokio::test]
    async fn test_transient_error_keeps_earlier_pages() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        let adapter = ScriptedAdapter::new(vec![
            page_of(&["a", "b"], true),
            Err(SourceError::Transient("network down".to_string())),
        ]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);
        let stats = fetcher.run(&adapter.queries_new(), &fast_options()).await;
        // the flushed batch survives the failed page
        assert_eq!(stats.inserted, 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_null_embeddings() {
        let store = store().await;
        let provider = StubProvider { fail: true };
        let adapter = ScriptedAdapter::new(vec![page_of(&["a", "b"], false)]);
        let fetcher = Fetcher::new(&adapter, &store, &provider);
        let stats = fetcher.run(&adapter.queries_new(), &fast_options()).await;

        // items are persisted anyway, without vectors
        assert_eq!(stats.inserted, 2);
        assert!(!store.has_embeddings(SourceKind::Paper).await.unwrap());
    }

    #[tokio::test]
    async fn test_budget_applies_when_pages_are_smaller_than_batches() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        // feed-style origin: many small pages, none of which fills a batch
        let pages: Vec<SourceResult<RawPage>> = (0..5)
            .map(|p| {
                let keys: Vec<String> = (0..3).map(|i| format!("s{}", p * 3 + i)).collect();
                let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
                page_of(&refs, true)
            })
            .collect();
        let adapter = ScriptedAdapter::new(pages);
        let fetcher = Fetcher::new(&adapter, &store, &provider);

        let mut opts = FetchOptions::recent();
        opts.page_delay = Duration::from_millis(0);
        opts.max_items = 2;
        let stats = fetcher.run(&adapter.queries_new(), &opts).await;

        assert_eq!(stats.fetched, 2);
        assert_eq!(adapter.pages_served.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_stops_the_whole_invocation() {
        let store = store().await;
        let provider = StubProvider { fail: false };
        let pages: Vec<SourceResult<RawPage>> = (0..50)
            .map(|p| {
                let keys: Vec<String> = (0..2).map(|i| format!("n{}", p * 2 + i)).collect();
                let refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
                page_of(&refs, true)
            })
            .collect();
        let adapter = ScriptedAdapter::new(pages);
        let fetcher = Fetcher::new(&adapter, &store, &provider);

        let mut opts = fast_options();
        opts.max_items = 6;
        let stats = fetcher.run(&adapter.queries_new(), &opts).await;
        assert!(stats.fetched >= 6);
        assert!(stats.fetched < 20);
    }
}
