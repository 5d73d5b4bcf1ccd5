//! arXiv source adapter.
//!
//! Pages through the arXiv Atom API across a fixed set of machine-learning
//! categories. Listing entries already carry everything the item model needs,
//! so hydration does no extra requests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use super::{Candidate, QuerySpec, RawPage, SourceAdapter, SourceError, SourceResult, Verdict};
use crate::embedding::squash_whitespace;
use crate::models::{
    truncate_utf8, Item, PaperItem, SortType, SourceCapabilities, SourceKind, MAX_AUTHORS_LEN,
};

/// Categories monitored by the incremental fetch.
pub const CATEGORIES: &[&str] = &["cs.CV", "cs.AI", "cs.LG", "cs.CL", "cs.NE", "stat.ML"];

const API_URL: &str = "http://export.arxiv.org/api/query";
const DEFAULT_PAGE_SIZE: usize = 100;

static ARXIV_CAPABILITIES: SourceCapabilities = SourceCapabilities {
    supports_vector_search: true,
    searchable_fields: &["title", "abstract", "authors"],
    fresh_literal: "fresh papers",
    hot_literal: "hot papers",
};

/// Adapter for the arXiv paper archive.
pub struct ArxivAdapter {
    client: reqwest::Client,
    page_size: usize,
}

impl ArxivAdapter {
    pub fn new(page_size: Option<usize>) -> Self {
        Self {
            client: reqwest::Client::new(),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}

impl Default for ArxivAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Parse the version from a trailing `v<N>` URL suffix; 1 when absent.
fn parse_version(url: &str) -> i32 {
    let last = url.rsplit('/').next().unwrap_or("");
    match last.rsplit('v').next() {
        Some(v) if v != last => v.parse().unwrap_or(1),
        _ => 1,
    }
}

/// Best-effort timestamp from an arXiv id segment like `2401.01234v2`,
/// used when the feed entry carries no usable date.
fn timestamp_from_url(url: &str) -> Option<DateTime<Utc>> {
    let last = url.rsplit('/').next()?;
    let yymm = last.get(0..4)?;
    let year: i32 = yymm.get(0..2)?.parse().ok()?;
    let month: u32 = yymm.get(2..4)?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Utc.with_ymd_and_hms(2000 + year, month, 1, 0, 0, 0).single()
}

fn entry_to_candidate(entry: &feed_rs::model::Entry) -> Option<Candidate> {
    let url = entry.id.clone();
    if url.is_empty() {
        return None;
    }

    let title = entry
        .title
        .as_ref()
        .map(|t| squash_whitespace(&t.content))
        .unwrap_or_default();
    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| squash_whitespace(&s.content))
        .unwrap_or_default();

    let mut authors = entry
        .authors
        .iter()
        .map(|a| a.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    truncate_utf8(&mut authors, MAX_AUTHORS_LEN);

    let tags = entry
        .categories
        .iter()
        .map(|c| c.term.clone())
        .collect::<Vec<_>>()
        .join(" | ");

    let pdf_url = entry
        .links
        .iter()
        .find(|l| l.media_type.as_deref() == Some("application/pdf"))
        .map(|l| l.href.clone());

    let published = entry
        .updated
        .or(entry.published)
        .or_else(|| timestamp_from_url(&url))
        .unwrap_or_else(Utc::now);

    Some(Candidate {
        natural_key: url.clone(),
        item: Item::Paper(PaperItem {
            id: None,
            version: parse_version(&url),
            url,
            title,
            abstract_text,
            authors,
            pdf_url,
            journal: None,
            doi: None,
            tags,
            published,
            popularity: 0,
            embedding: None,
        }),
    })
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Paper
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &ARXIV_CAPABILITIES
    }

    fn queries_new(&self) -> Vec<QuerySpec> {
        let query = CATEGORIES
            .iter()
            .map(|c| format!("cat:{}", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        vec![QuerySpec {
            label: "arxiv recent".to_string(),
            query,
            sort: SortType::Time,
            bucket: None,
        }]
    }

    fn queries_all(&self) -> Vec<QuerySpec> {
        // one query per category so backfill quotas can be tracked per bucket
        CATEGORIES
            .iter()
            .map(|c| QuerySpec {
                label: format!("arxiv {}", c),
                query: format!("cat:{}", c),
                sort: SortType::Time,
                bucket: Some(c.to_string()),
            })
            .collect()
    }

    async fn fetch_page(&self, query: &QuerySpec, page: u32) -> SourceResult<RawPage> {
        let start = page as usize * self.page_size;
        let response = self
            .client
            .get(API_URL)
            .query(&[
                ("search_query", query.query.as_str()),
                ("start", &start.to_string()),
                ("max_results", &self.page_size.to_string()),
                ("sortBy", "lastUpdatedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("arXiv API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Transient(format!(
                "arXiv API returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transient(format!("arXiv API body read failed: {}", e)))?;

        let feed = feed_rs::parser::parse(&body[..])
            .map_err(|e| SourceError::Parse(format!("arXiv Atom parse failed: {}", e)))?;

        debug!(query = %query.query, page, entries = feed.entries.len(), "fetched arXiv page");

        let candidates: Vec<Candidate> =
            feed.entries.iter().filter_map(entry_to_candidate).collect();
        let has_more = feed.entries.len() == self.page_size;

        Ok(RawPage { candidates, has_more })
    }

    async fn hydrate(&self, candidate: Candidate) -> SourceResult<Verdict> {
        // the listing entry is already complete; only sanity-check it
        match &candidate.item {
            Item::Paper(p) if p.title.is_empty() => {
                Ok(Verdict::Reject("missing title".to_string()))
            }
            _ => Ok(Verdict::Keep(candidate.item)),
        }
    }

    fn embed_text(&self, item: &Item) -> Option<String> {
        match item {
            Item::Paper(p) => Some(format!(
                "Title: {}\nAuthors: {}\nAbstract: {}",
                p.title, p.authors, p.abstract_text
            )),
            _ => None,
        }
    }
}
