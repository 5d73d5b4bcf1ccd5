//! Core data models for the content monitor.
//!
//! This module contains the fundamental data structures used across the
//! application: the per-source item variants, the source kind tag, sort
//! preferences and the per-source capability descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored length for author lists and similar free-text fields.
pub const MAX_AUTHORS_LEN: usize = 800;

/// Maximum stored length for README excerpts.
pub const MAX_README_LEN: usize = 10_000;

/// Canonicalize an archive paper link to the stored natural-key form.
///
/// Social posts and external pages link papers in several shapes: the PDF
/// path, the abstract path, with or without a version suffix. Rows are keyed
/// by the versioned abstract URL, so a `/pdf/` path is rewritten to `/abs/`,
/// a `.pdf` extension is stripped, and a missing version defaults to `v1`.
pub fn canonical_paper_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_ext = trimmed.strip_suffix(".pdf").unwrap_or(trimmed);
    let mut canonical = without_ext.replace("/pdf/", "/abs/");

    let has_version = canonical
        .rsplit('/')
        .next()
        .and_then(|last| last.rfind('v').map(|i| &last[i + 1..]))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()));
    if !has_version {
        canonical.push_str("v1");
    }
    canonical
}

/// Truncate a string to at most `max` bytes without splitting a character.
pub fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// The kind of content a source produces.
///
/// Each kind maps to its own table in storage and carries kind-specific
/// metadata on its item variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Research papers (archive or journal feed)
    Paper,

    /// Code repositories
    Repository,

    /// Social media posts
    Social,
}

impl SourceKind {
    /// Short lowercase name used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Paper => "paper",
            SourceKind::Repository => "repository",
            SourceKind::Social => "social",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort preference for retrieval queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortType {
    /// Most recent first
    Time,

    /// Highest popularity (stars for repositories) first
    Popularity,

    /// Preserve similarity order from the vector search
    #[default]
    Relevance,
}

impl SortType {
    /// Parse a sort preference from a request string.
    ///
    /// Unknown values fall back to `Time` rather than failing, so a caller
    /// sending a bad parameter still gets a sensible ordering.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "popularity" | "hot" => SortType::Popularity,
            "relevance" => SortType::Relevance,
            _ => SortType::Time,
        }
    }
}

/// A research paper from an archive or journal feed.
///
/// The natural key is the canonical article URL. For versioned archives the
/// full URL including the version suffix is the stored key, so a new version
/// creates a new row only when the URL differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperItem {
    /// Database primary key, assigned on insert
    pub id: Option<i64>,

    /// Canonical article URL (natural key, unique per table)
    pub url: String,

    /// Version parsed from a trailing `v<N>` URL suffix (1 when absent)
    pub version: i32,

    /// Paper title, whitespace-normalized
    pub title: String,

    /// Abstract text, whitespace-normalized
    pub abstract_text: String,

    /// Comma-joined author list, truncated to [`MAX_AUTHORS_LEN`]
    pub authors: String,

    /// Direct PDF link when the origin provides one
    pub pdf_url: Option<String>,

    /// Journal name or journal reference, when known
    pub journal: Option<String>,

    /// DOI, when extractable
    pub doi: Option<String>,

    /// Category/topic tags joined with " | "
    pub tags: String,

    /// Publication timestamp (best effort; synthesized when missing)
    pub published: DateTime<Utc>,

    /// Popularity counter, monotonically non-decreasing
    pub popularity: i64,

    /// Embedding of the combined title/authors/abstract text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A code repository from a code-host API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoItem {
    /// Database primary key, assigned on insert
    pub id: Option<i64>,

    /// Origin-assigned repository id (natural key, unique per table)
    pub repo_id: String,

    /// Repository name
    pub name: String,

    /// Full `owner/name` identifier
    pub full_name: String,

    /// Short description, whitespace-normalized
    pub description: String,

    /// Repository page URL
    pub html_url: String,

    /// Clone URL
    pub clone_url: String,

    /// Star count
    pub stars: i64,

    /// Fork count
    pub forks: i64,

    /// Primary language
    pub language: String,

    /// Comma-joined topic tags
    pub topics: String,

    /// README excerpt, truncated to [`MAX_README_LEN`]
    pub readme: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Embedding of the combined name/description/topics/README text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A social media post.
///
/// Social items carry no embedding; they are served through the keyword and
/// recency/popularity paths only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialItem {
    /// Database primary key, assigned on insert
    pub id: Option<i64>,

    /// Origin-assigned post id (natural key, unique per table)
    pub post_id: String,

    /// Author handle or name
    pub author: String,

    /// Post text body
    pub content: String,

    /// Post timestamp
    pub published: DateTime<Utc>,

    /// Popularity counter (likes/favourites), monotonically non-decreasing
    pub popularity: i64,

    /// Attached picture URL, when present
    pub pic_url: Option<String>,
}

/// The unit of content, one variant per source kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Paper(PaperItem),
    Repo(RepoItem),
    Social(SocialItem),
}

impl Item {
    /// The kind of this item.
    pub fn kind(&self) -> SourceKind {
        match self {
            Item::Paper(_) => SourceKind::Paper,
            Item::Repo(_) => SourceKind::Repository,
            Item::Social(_) => SourceKind::Social,
        }
    }

    /// The origin-assigned stable identifier for this item.
    pub fn natural_key(&self) -> &str {
        match self {
            Item::Paper(p) => &p.url,
            Item::Repo(r) => &r.repo_id,
            Item::Social(s) => &s.post_id,
        }
    }

    /// Database primary key, when the item has been persisted.
    pub fn id(&self) -> Option<i64> {
        match self {
            Item::Paper(p) => p.id,
            Item::Repo(r) => r.id,
            Item::Social(s) => s.id,
        }
    }

    /// The primary timestamp used for recency filtering and time ordering.
    ///
    /// Repositories use their last-update time; papers and posts their
    /// publication time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Item::Paper(p) => p.published,
            Item::Repo(r) => r.updated_at,
            Item::Social(s) => s.published,
        }
    }

    /// The popularity-like field used for "hot" ordering.
    ///
    /// Stars for repositories, the popularity counter otherwise.
    pub fn popularity_score(&self) -> i64 {
        match self {
            Item::Paper(p) => p.popularity,
            Item::Repo(r) => r.stars,
            Item::Social(s) => s.popularity,
        }
    }

    /// The stored embedding, when one was computed.
    pub fn embedding(&self) -> Option<&[f32]> {
        match self {
            Item::Paper(p) => p.embedding.as_deref(),
            Item::Repo(r) => r.embedding.as_deref(),
            Item::Social(_) => None,
        }
    }

    /// A short human-readable label for logs.
    pub fn label(&self) -> &str {
        match self {
            Item::Paper(p) => &p.title,
            Item::Repo(r) => &r.full_name,
            Item::Social(s) => &s.author,
        }
    }
}

/// Per-source capability descriptor, resolved once at adapter construction.
///
/// Replaces runtime "does this model have an embedding field" probing: the
/// retrieval engine consults these flags instead of inspecting data.
#[derive(Debug, Clone)]
pub struct SourceCapabilities {
    /// Whether items of this source carry embeddings at all
    pub supports_vector_search: bool,

    /// Text fields scanned by the keyword fallback path
    pub searchable_fields: &'static [&'static str],

    /// Reserved query literal that means "just give me recent items"
    pub fresh_literal: &'static str,

    /// Reserved query literal that means "order by popularity"
    pub hot_literal: &'static str,
}

impl SourceCapabilities {
    /// Whether `keywords` is one of the reserved literals that bypass
    /// similarity search (case-insensitive).
    pub fn reserved_literal(&self, keywords: &str) -> Option<SortType> {
        let kw = keywords.trim().to_lowercase();
        if kw == self.fresh_literal {
            Some(SortType::Time)
        } else if kw == self.hot_literal {
            Some(SortType::Popularity)
        } else {
            None
        }
    }
}
