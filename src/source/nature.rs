//! Nature journal feed adapter.
//!
//! Reads a fixed set of Nature RSS feeds. Feed entries often carry a
//! truncated or empty abstract, so hydration fetches the article page and
//! pulls the abstract and author list out of its JSON-LD block, falling
//! back to a chain of CSS selectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::debug;

use super::{Candidate, QuerySpec, RawPage, SourceAdapter, SourceError, SourceResult, Verdict};
use crate::embedding::squash_whitespace;
use crate::models::{
    truncate_utf8, Item, PaperItem, SortType, SourceCapabilities, SourceKind, MAX_AUTHORS_LEN,
};

/// An abstract shorter than this is considered a teaser and triggers an
/// article-page fetch during hydration.
pub const MIN_ABSTRACT_LEN: usize = 50;

/// The journal feeds the adapter monitors.
pub const FEEDS: &[(&str, &str)] = &[
    (
        "Nature Machine Intelligence",
        "https://www.nature.com/natmachintell.rss",
    ),
    (
        "Nature Computational Science",
        "https://www.nature.com/natcomputsci.rss",
    ),
    ("Nature", "https://www.nature.com/nature.rss"),
    (
        "Nature AI/ML Articles",
        "https://www.nature.com/search.rss?subject=artificial-intelligence",
    ),
    (
        "Nature Computer Science Articles",
        "https://www.nature.com/search.rss?subject=computer-science",
    ),
];

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Selectors tried in order when the JSON-LD block yields no abstract.
const ABSTRACT_SELECTORS: &[&str] = &[
    "div#Abs1-content",
    "div.c-article-section__content[data-test=\"abstract\"]",
    "div.c-article-teaser p",
    "p.article__teaser",
    "section.c-article-section[data-title=\"Abstract\"] p",
    "p.c-article-teaser__text",
    "meta[name=\"description\"]",
];

static NATURE_CAPABILITIES: SourceCapabilities = SourceCapabilities {
    supports_vector_search: true,
    searchable_fields: &["title", "abstract", "authors"],
    fresh_literal: "fresh papers",
    hot_literal: "hot papers",
};

/// Adapter for the Nature journal feeds.
pub struct NatureAdapter {
    client: reqwest::Client,
}

impl NatureAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_article_details(&self, url: &str) -> SourceResult<ArticleDetails> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Referer", "https://www.nature.com/")
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("article page fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Transient(format!(
                "article page returned status {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SourceError::Transient(format!("article page read failed: {}", e)))?;

        Ok(extract_article_details(&html))
    }
}

impl Default for NatureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields scraped from an article page.
#[derive(Debug, Default)]
struct ArticleDetails {
    abstract_text: String,
    authors: String,
    doi: Option<String>,
}

/// Strip markup from a feed summary, which may arrive as an HTML fragment.
fn strip_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    squash_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

/// DOI from a Nature article URL path (`/articles/<doi-suffix>`).
fn doi_from_url(url: &str) -> Option<String> {
    let path = url.split("nature.com").nth(1)?;
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    if parts.next() == Some("articles") {
        parts.next().map(|s| s.to_string())
    } else {
        None
    }
}

fn extract_jsonld(doc: &Html) -> ArticleDetails {
    let mut details = ArticleDetails::default();
    let selector = match Selector::parse("script[type=\"application/ld+json\"]") {
        Ok(s) => s,
        Err(_) => return details,
    };
    for script in doc.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        if let Some(desc) = data.get("description").and_then(|v| v.as_str()) {
            details.abstract_text = squash_whitespace(desc);
        }
        if let Some(authors) = data.get("author").and_then(|v| v.as_array()) {
            let names: Vec<&str> = authors
                .iter()
                .filter_map(|a| a.get("name").and_then(|n| n.as_str()))
                .collect();
            details.authors = names.join(", ");
            truncate_utf8(&mut details.authors, MAX_AUTHORS_LEN);
        }
        if let Some(same_as) = data.get("sameAs").and_then(|v| v.as_array()) {
            details.doi = same_as
                .iter()
                .filter_map(|v| v.as_str())
                .find(|s| s.contains("doi.org"))
                .and_then(|s| s.split("doi.org/").nth(1))
                .map(|s| s.to_string());
        }
        if !details.abstract_text.is_empty() {
            break;
        }
    }
    details
}

fn extract_article_details(html: &str) -> ArticleDetails {
    let doc = Html::parse_document(html);
    let mut details = extract_jsonld(&doc);

    if details.abstract_text.chars().count() < MIN_ABSTRACT_LEN {
        for selector_str in ABSTRACT_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            let text: String = doc
                .select(&selector)
                .map(|el| {
                    el.value()
                        .attr("content")
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| el.text().collect::<Vec<_>>().join(" "))
                })
                .collect::<Vec<_>>()
                .join(" ");
            let text = squash_whitespace(&text);
            if text.chars().count() >= MIN_ABSTRACT_LEN {
                details.abstract_text = text;
                break;
            }
        }
    }

    // last resort: the leading body paragraphs
    if details.abstract_text.chars().count() < MIN_ABSTRACT_LEN {
        if let Ok(selector) = Selector::parse("div.c-article-body p, article p") {
            let text: String = doc
                .select(&selector)
                .take(3)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join(" ");
            details.abstract_text = squash_whitespace(&text);
        }
    }

    if details.authors.is_empty() {
        if let Ok(selector) = Selector::parse("meta[name=\"citation_author\"]") {
            let names: Vec<&str> = doc
                .select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .collect();
            details.authors = names.join(", ");
            truncate_utf8(&mut details.authors, MAX_AUTHORS_LEN);
        }
    }

    details
}

fn entry_to_candidate(entry: &feed_rs::model::Entry, journal: &str) -> Option<Candidate> {
    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .filter(|h| !h.is_empty())?;

    let title = entry
        .title
        .as_ref()
        .map(|t| squash_whitespace(&t.content))
        .unwrap_or_default();
    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| strip_html(&s.content))
        .unwrap_or_default();

    let mut authors = entry
        .authors
        .iter()
        .map(|a| a.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    truncate_utf8(&mut authors, MAX_AUTHORS_LEN);

    let doi = if entry.id.contains("doi.org") {
        entry.id.split("doi.org/").nth(1).map(|s| s.to_string())
    } else {
        doi_from_url(&url)
    };

    let published = entry
        .published
        .or(entry.updated)
        .unwrap_or_else(Utc::now);

    Some(Candidate {
        natural_key: url.clone(),
        item: Item::Paper(PaperItem {
            id: None,
            url,
            version: 1,
            title,
            abstract_text,
            authors,
            pdf_url: None,
            journal: Some(journal.to_string()),
            doi,
            tags: String::new(),
            published,
            popularity: 0,
            embedding: None,
        }),
    })
}

#[async_trait]
impl SourceAdapter for NatureAdapter {
    fn name(&self) -> &'static str {
        "nature"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Paper
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &NATURE_CAPABILITIES
    }

    fn queries_new(&self) -> Vec<QuerySpec> {
        FEEDS
            .iter()
            .map(|(name, url)| QuerySpec {
                label: format!("nature {}", name),
                query: url.to_string(),
                sort: SortType::Time,
                bucket: Some(name.to_string()),
            })
            .collect()
    }

    fn queries_all(&self) -> Vec<QuerySpec> {
        // the feeds are the only query surface; backfill runs the same set
        self.queries_new()
    }

    async fn fetch_page(&self, query: &QuerySpec, page: u32) -> SourceResult<RawPage> {
        // RSS feeds are a single page; later pages are legitimately empty
        if page > 0 {
            return Ok(RawPage {
                candidates: Vec::new(),
                has_more: false,
            });
        }

        let response = self
            .client
            .get(&query.query)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("RSS fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Transient(format!(
                "RSS feed returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transient(format!("RSS body read failed: {}", e)))?;

        let feed = feed_rs::parser::parse(&body[..])
            .map_err(|e| SourceError::Parse(format!("RSS parse failed: {}", e)))?;

        let journal = query.bucket.as_deref().unwrap_or("Nature");
        debug!(feed = %query.label, entries = feed.entries.len(), "fetched Nature feed");

        let candidates = feed
            .entries
            .iter()
            .filter_map(|e| entry_to_candidate(e, journal))
            .collect();

        Ok(RawPage {
            candidates,
            has_more: false,
        })
    }

    async fn hydrate(&self, candidate: Candidate) -> SourceResult<Verdict> {
        let Item::Paper(mut paper) = candidate.item else {
            return Ok(Verdict::Reject("not a paper item".to_string()));
        };

        if paper.title.is_empty() {
            return Ok(Verdict::Reject("missing title".to_string()));
        }

        // feed teasers are often too short to be worth embedding; pull the
        // real abstract from the article page
        if paper.abstract_text.chars().count() < MIN_ABSTRACT_LEN || paper.authors.is_empty() {
            match self.fetch_article_details(&paper.url).await {
                Ok(details) => {
                    if paper.abstract_text.chars().count() < MIN_ABSTRACT_LEN
                        && details.abstract_text.chars().count()
                            >= paper.abstract_text.chars().count()
                    {
                        paper.abstract_text = details.abstract_text;
                    }
                    if paper.authors.is_empty() {
                        paper.authors = details.authors;
                    }
                    if paper.doi.is_none() {
                        paper.doi = details.doi;
                    }
                }
                Err(e) => {
                    // degraded fields are acceptable; the length check below
                    // decides whether the item is still worth keeping
                    debug!(url = %paper.url, error = %e, "article page fetch failed");
                }
            }
        }

        if paper.abstract_text.chars().count() < MIN_ABSTRACT_LEN {
            return Ok(Verdict::Reject("abstract too short".to_string()));
        }

        Ok(Verdict::Keep(Item::Paper(paper)))
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
