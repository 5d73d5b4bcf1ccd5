//! GitHub source adapter.
//!
//! Searches the GitHub repository API across a fixed set of topic queries.
//! Hydration fetches the README (new repositories only, after dedup) and
//! runs the quality rule chain before anything is committed.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use super::quality::{self, QualityThresholds};
use super::{Candidate, QuerySpec, RawPage, SourceAdapter, SourceError, SourceResult, Verdict};
use crate::embedding::squash_whitespace;
use crate::models::{
    truncate_utf8, Item, RepoItem, SortType, SourceCapabilities, SourceKind, MAX_README_LEN,
};

/// Topic queries driving both incremental and backfill runs.
pub const TOPIC_QUERIES: &[(&str, &str)] = &[
    ("computer-science", "topic:computer-science"),
    (
        "ai-ml",
        "(topic:artificial-intelligence OR topic:ai OR topic:ml OR topic:machine-learning)",
    ),
    (
        "deep-learning",
        "(topic:deep-learning OR topic:llm OR topic:large-language-model)",
    ),
    (
        "computer-vision",
        "(topic:computer-vision OR topic:cv OR topic:image-processing)",
    ),
    ("nlp", "(topic:nlp OR topic:natural-language-processing)"),
    (
        "robotics",
        "(topic:robotics OR topic:robot OR topic:automation)",
    ),
    (
        "software-engineering",
        "(topic:software-engineering OR topic:devops OR topic:ci-cd)",
    ),
    (
        "distributed-systems",
        "(topic:distributed-systems OR topic:cloud OR topic:microservices)",
    ),
    ("quantum", "(topic:quantum-computing OR topic:quantum)"),
    (
        "data-science",
        "(topic:data-science OR topic:big-data OR topic:analytics)",
    ),
];

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// The search API never serves results past this offset.
const SEARCH_RESULT_CAP: usize = 1000;

static GITHUB_CAPABILITIES: SourceCapabilities = SourceCapabilities {
    supports_vector_search: true,
    searchable_fields: &["name", "description", "readme", "topics"],
    fresh_literal: "fresh repos",
    hot_literal: "hot repos",
};

/// Adapter for the GitHub code host.
pub struct GithubAdapter {
    client: reqwest::Client,
    token: String,
    thresholds: QualityThresholds,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoData>,
}

#[derive(Debug, Deserialize)]
struct RepoData {
    id: i64,
    name: String,
    full_name: String,
    description: Option<String>,
    html_url: String,
    clone_url: String,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    content: Option<String>,
}

fn parse_github_date(s: Option<&str>) -> DateTime<Utc> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

impl GithubAdapter {
    /// Create the adapter. A missing or empty API token is a configuration
    /// error: the search API's unauthenticated rate limit is unusable for
    /// this workload, so the adapter refuses to be constructed.
    pub fn new(token: Option<String>, thresholds: Option<QualityThresholds>) -> SourceResult<Self> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SourceError::Config("GITHUB_TOKEN is not set".to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            token,
            thresholds: thresholds.unwrap_or_default(),
        })
    }

    async fn fetch_readme(&self, full_name: &str) -> SourceResult<String> {
        let response = self
            .client
            .get(format!("{}/repos/{}/readme", API_BASE, full_name))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "sciwatch")
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("README request failed: {}", e)))?;

        if !response.status().is_success() {
            // repositories without a README are a normal case
            return Ok(String::new());
        }

        let readme: ReadmeResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("README response parse failed: {}", e)))?;

        let Some(content) = readme.content else {
            return Ok(String::new());
        };

        // the API base64-encodes README content with embedded newlines
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SourceError::Parse(format!("README base64 decode failed: {}", e)))?;

        let mut text = String::from_utf8_lossy(&decoded).into_owned();
        truncate_utf8(&mut text, MAX_README_LEN);
        Ok(text)
    }
}

fn repo_to_candidate(data: RepoData) -> Candidate {
    let description = squash_whitespace(&data.description.unwrap_or_default());
    Candidate {
        natural_key: data.id.to_string(),
        item: Item::Repo(RepoItem {
            id: None,
            repo_id: data.id.to_string(),
            name: data.name,
            full_name: data.full_name,
            description,
            html_url: data.html_url,
            clone_url: data.clone_url,
            stars: data.stargazers_count,
            forks: data.forks_count,
            language: data.language.unwrap_or_default(),
            topics: data.topics.join(","),
            readme: String::new(),
            created_at: parse_github_date(data.created_at.as_deref()),
            updated_at: parse_github_date(data.updated_at.as_deref()),
            embedding: None,
        }),
    }
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn name(&self) -> &'static str {
        "github"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &GITHUB_CAPABILITIES
    }

    fn queries_new(&self) -> Vec<QuerySpec> {
        let one_week_ago = (Utc::now() - Duration::days(7)).format("%Y-%m-%d");
        TOPIC_QUERIES
            .iter()
            .map(|(label, q)| QuerySpec {
                label: format!("github {}", label),
                query: format!("{} stars:>100 pushed:>{}", q, one_week_ago),
                sort: SortType::Time,
                bucket: Some(label.to_string()),
            })
            .collect()
    }

    fn queries_all(&self) -> Vec<QuerySpec> {
        let one_month_ago = (Utc::now() - Duration::days(30)).format("%Y-%m-%d");
        let today = Utc::now().format("%Y-%m-%d");
        TOPIC_QUERIES
            .iter()
            .map(|(label, q)| QuerySpec {
                label: format!("github {}", label),
                query: format!("{} stars:>100 pushed:{}..{}", q, one_month_ago, today),
                sort: SortType::Popularity,
                bucket: Some(label.to_string()),
            })
            .collect()
    }

    async fn fetch_page(&self, query: &QuerySpec, page: u32) -> SourceResult<RawPage> {
        let sort = match query.sort {
            SortType::Popularity => "stars",
            _ => "updated",
        };
        // the search API is 1-indexed
        let api_page = page as usize + 1;
        let response = self
            .client
            .get(format!("{}/search/repositories", API_BASE))
            .query(&[
                ("q", query.query.as_str()),
                ("sort", sort),
                ("order", "desc"),
                ("per_page", &PER_PAGE.to_string()),
                ("page", &api_page.to_string()),
            ])
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "sciwatch")
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("search request failed: {}", e)))?;

        if response.status().as_u16() == 403 || response.status().as_u16() == 429 {
            return Err(SourceError::Transient("rate limited by search API".to_string()));
        }
        if !response.status().is_success() {
            return Err(SourceError::Transient(format!(
                "search API returned status {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("search response parse failed: {}", e)))?;

        debug!(query = %query.label, page, items = parsed.items.len(), "fetched GitHub page");

        let full_page = parsed.items.len() == PER_PAGE;
        let under_cap = api_page * PER_PAGE < SEARCH_RESULT_CAP;
        let candidates = parsed.items.into_iter().map(repo_to_candidate).collect();

        Ok(RawPage {
            candidates,
            has_more: full_page && under_cap,
        })
    }

    async fn hydrate(&self, candidate: Candidate) -> SourceResult<Verdict> {
        let Item::Repo(mut repo) = candidate.item else {
            return Ok(Verdict::Reject("not a repository item".to_string()));
        };

        // README fetch failure degrades to an empty README, which the
        // quality chain will reject on its own terms
        repo.readme = self.fetch_readme(&repo.full_name).await.unwrap_or_default();

        if let Some(reason) = quality::evaluate(&repo, &self.thresholds, Utc::now()) {
            return Ok(Verdict::Reject(reason.to_string()));
        }

        Ok(Verdict::Keep(Item::Repo(repo)))
    }

    fn embed_text(&self, item: &Item) -> Option<String> {
        match item {
            Item::Repo(r) => Some(format!(
                "Repository: {}\nDescription: {}\nTopics: {}\nReadme: {}",
                r.name, r.description, r.topics, r.readme
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_a_config_error() {
        assert!(matches!(
            GithubAdapter::new(None, None),
            Err(SourceError::Config(_))
        ));
        assert!(matches!(
            GithubAdapter::new(Some("  ".to_string()), None),
            Err(SourceError::Config(_))
        ));
        assert!(GithubAdapter::new(Some("ghp_token".to_string()), None).is_ok());
    }

    #[test]
    fn new_queries_constrain_recency_and_stars() {
        let adapter = GithubAdapter::new(Some("t".to_string()), None).unwrap();
        let queries = adapter.queries_new();
        assert_eq!(queries.len(), TOPIC_QUERIES.len());
        assert!(queries[0].query.contains("stars:>100"));
        assert!(queries[0].query.contains("pushed:>"));
        assert_eq!(queries[0].sort, SortType::Time);
    }

    #[test]
    fn backfill_queries_use_a_date_window_and_star_sort() {
        let adapter = GithubAdapter::new(Some("t".to_string()), None).unwrap();
        let queries = adapter.queries_all();
        assert!(queries[0].query.contains("pushed:2"));
        assert!(queries[0].query.contains(".."));
        assert_eq!(queries[0].sort, SortType::Popularity);
    }

    #[test]
    fn github_dates_parse_with_a_now_fallback() {
        let ts = parse_github_date(Some("2024-03-15T10:30:00Z"));
        assert_eq!(ts.format("%Y-%m-%d").to_string(), "2024-03-15");
        // unparseable dates degrade to now rather than failing the item
        let fallback = parse_github_date(Some("not a date"));
        assert!(Utc::now() - fallback < Duration::seconds(5));
    }

    #[test]
    fn candidate_key_is_the_origin_repo_id() {
        let candidate = repo_to_candidate(RepoData {
            id: 987,
            name: "widget".to_string(),
            full_name: "owner/widget".to_string(),
            description: Some("does  things\nwell".to_string()),
            html_url: String::new(),
            clone_url: String::new(),
            stargazers_count: 5,
            forks_count: 1,
            language: None,
            topics: vec!["rust".to_string(), "cli".to_string()],
            created_at: None,
            updated_at: None,
        });
        assert_eq!(candidate.natural_key, "987");
        let Item::Repo(repo) = candidate.item else {
            panic!("expected a repo item")
        };
        assert_eq!(repo.description, "does things well");
        assert_eq!(repo.topics, "rust,cli");
    }
}
