//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `ItemStore`
//! trait. It uses rusqlite for database access and stores embeddings as
//! float32 little-endian BLOBs.

use super::{cosine_distance, ItemStore, OrderField, StorageError, StorageResult};
use crate::models::{Item, PaperItem, RepoItem, SocialItem, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite-based item storage.
///
/// One table per source kind. Natural keys carry UNIQUE constraints, so
/// `INSERT OR IGNORE` is the dedup backstop under concurrent flushes.
/// Timestamps are stored as epoch seconds; nearest-neighbour search is a
/// brute-force scan over the embedded rows, which is adequate at the row
/// counts a single monitor accumulates.
///
/// # Schema
/// - `papers`: archive and journal articles, keyed by canonical URL
/// - `repos`: code repositories, keyed by origin repository id
/// - `posts`: social posts, keyed by origin post id
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn deserialize_embedding(bytes: &[u8]) -> StorageResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::SerializationError(format!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn to_epoch(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Table name for a source kind.
fn table(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => "papers",
        SourceKind::Repository => "repos",
        SourceKind::Social => "posts",
    }
}

/// Natural-key column for a source kind.
fn key_column(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => "url",
        SourceKind::Repository => "repo_id",
        SourceKind::Social => "post_id",
    }
}

/// Primary-timestamp column for a source kind.
fn ts_column(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => "published",
        SourceKind::Repository => "updated_at",
        SourceKind::Social => "published",
    }
}

/// Popularity-like column for a source kind.
fn pop_column(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => "popularity",
        SourceKind::Repository => "stars",
        SourceKind::Social => "popularity",
    }
}

/// Text columns scanned by the keyword fallback for a source kind.
fn search_columns(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::Paper => &["title", "abstract", "authors"],
        SourceKind::Repository => &["name", "description", "readme", "topics"],
        SourceKind::Social => &["content", "author"],
    }
}

fn query_err(e: rusqlite::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

fn paper_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let embedding: Option<Vec<u8>> = row.get(12)?;
    Ok(Item::Paper(PaperItem {
        id: Some(row.get(0)?),
        url: row.get(1)?,
        version: row.get(2)?,
        title: row.get(3)?,
        abstract_text: row.get(4)?,
        authors: row.get(5)?,
        pdf_url: row.get(6)?,
        journal: row.get(7)?,
        doi: row.get(8)?,
        tags: row.get(9)?,
        published: from_epoch(row.get(10)?),
        popularity: row.get(11)?,
        embedding: embedding.and_then(|b| deserialize_embedding(&b).ok()),
    }))
}

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let embedding: Option<Vec<u8>> = row.get(14)?;
    Ok(Item::Repo(RepoItem {
        id: Some(row.get(0)?),
        repo_id: row.get(1)?,
        name: row.get(2)?,
        full_name: row.get(3)?,
        description: row.get(4)?,
        html_url: row.get(5)?,
        clone_url: row.get(6)?,
        stars: row.get(7)?,
        forks: row.get(8)?,
        language: row.get(9)?,
        topics: row.get(10)?,
        readme: row.get(11)?,
        created_at: from_epoch(row.get(12)?),
        updated_at: from_epoch(row.get(13)?),
        embedding: embedding.and_then(|b| deserialize_embedding(&b).ok()),
    }))
}

fn social_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item::Social(SocialItem {
        id: Some(row.get(0)?),
        post_id: row.get(1)?,
        author: row.get(2)?,
        content: row.get(3)?,
        published: from_epoch(row.get(4)?),
        popularity: row.get(5)?,
        pic_url: row.get(6)?,
    }))
}

/// The full column list in the order the row-mapping functions expect.
fn select_columns(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Paper => {
            "id, url, version, title, abstract, authors, pdf_url, journal, doi, \
             tags, published, popularity, embedding"
        }
        SourceKind::Repository => {
            "id, repo_id, name, full_name, description, html_url, clone_url, \
             stars, forks, language, topics, readme, created_at, updated_at, embedding"
        }
        SourceKind::Social => "id, post_id, author, content, published, popularity, pic_url",
    }
}

fn item_from_row(kind: SourceKind, row: &Row<'_>) -> rusqlite::Result<Item> {
    match kind {
        SourceKind::Paper => paper_from_row(row),
        SourceKind::Repository => repo_from_row(row),
        SourceKind::Social => social_from_row(row),
    }
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the file cannot be opened
    pub fn open<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS papers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL DEFAULT 1,
                title TEXT NOT NULL,
                abstract TEXT NOT NULL,
                authors TEXT NOT NULL,
                pdf_url TEXT,
                journal TEXT,
                doi TEXT,
                tags TEXT NOT NULL DEFAULT '',
                published INTEGER NOT NULL,
                popularity INTEGER NOT NULL DEFAULT 0,
                embedding BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_papers_published ON papers(published);
            CREATE INDEX IF NOT EXISTS idx_papers_popularity ON papers(popularity);

            CREATE TABLE IF NOT EXISTS repos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                full_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                html_url TEXT NOT NULL,
                clone_url TEXT NOT NULL,
                stars INTEGER NOT NULL DEFAULT 0,
                forks INTEGER NOT NULL DEFAULT 0,
                language TEXT NOT NULL DEFAULT '',
                topics TEXT NOT NULL DEFAULT '',
                readme TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                embedding BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_repos_updated ON repos(updated_at);
            CREATE INDEX IF NOT EXISTS idx_repos_stars ON repos(stars);

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id TEXT NOT NULL UNIQUE,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                published INTEGER NOT NULL,
                popularity INTEGER NOT NULL DEFAULT 0,
                pic_url TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(published);",
        )
        .map_err(|e| StorageError::SchemaError(e.to_string()))
    }

    fn insert_one(tx: &rusqlite::Transaction<'_>, item: &Item) -> StorageResult<usize> {
        let changed = match item {
            Item::Paper(p) => tx
                .execute(
                    "INSERT OR IGNORE INTO papers
                     (url, version, title, abstract, authors, pdf_url, journal, doi,
                      tags, published, popularity, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        p.url,
                        p.version,
                        p.title,
                        p.abstract_text,
                        p.authors,
                        p.pdf_url,
                        p.journal,
                        p.doi,
                        p.tags,
                        to_epoch(p.published),
                        p.popularity,
                        p.embedding.as_deref().map(serialize_embedding),
                    ],
                )
                .map_err(query_err)?,
            Item::Repo(r) => tx
                .execute(
                    "INSERT OR IGNORE INTO repos
                     (repo_id, name, full_name, description, html_url, clone_url,
                      stars, forks, language, topics, readme, created_at, updated_at, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        r.repo_id,
                        r.name,
                        r.full_name,
                        r.description,
                        r.html_url,
                        r.clone_url,
                        r.stars,
                        r.forks,
                        r.language,
                        r.topics,
                        r.readme,
                        to_epoch(r.created_at),
                        to_epoch(r.updated_at),
                        r.embedding.as_deref().map(serialize_embedding),
                    ],
                )
                .map_err(query_err)?,
            Item::Social(s) => tx
                .execute(
                    "INSERT OR IGNORE INTO posts
                     (post_id, author, content, published, popularity, pic_url)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        s.post_id,
                        s.author,
                        s.content,
                        to_epoch(s.published),
                        s.popularity,
                        s.pic_url,
                    ],
                )
                .map_err(query_err)?,
        };
        Ok(changed)
    }

    fn page_query(
        conn: &Connection,
        kind: SourceKind,
        order_col: &str,
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
    ) -> StorageResult<Vec<Item>> {
        let since_epoch = since.map(to_epoch).unwrap_or(i64::MIN);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} >= ?1 ORDER BY {} DESC LIMIT ?2 OFFSET ?3",
            select_columns(kind),
            table(kind),
            ts_column(kind),
            order_col,
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params![since_epoch, num as i64, start as i64], |row| {
                item_from_row(kind, row)
            })
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        Self::create_schema(&conn)
    }

    async fn existing_keys(
        &self,
        kind: SourceKind,
        keys: &[String],
    ) -> StorageResult<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn.lock().await;
        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT {key} FROM {table} WHERE {key} IN ({placeholders})",
            key = key_column(kind),
            table = table(kind),
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(keys.iter()), |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<HashSet<_>>>().map_err(query_err)
    }

    async fn insert_batch(&self, items: &[Item]) -> StorageResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(query_err)?;
        let mut inserted = 0;
        for item in items {
            inserted += Self::insert_one(&tx, item)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    async fn refresh_repo_activity(
        &self,
        repo_id: &str,
        stars: i64,
        forks: i64,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE repos SET
                     stars = MAX(stars, ?2),
                     forks = ?3,
                     updated_at = MAX(updated_at, ?4)
                 WHERE repo_id = ?1",
                params![repo_id, stars, forks, to_epoch(updated_at)],
            )
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    async fn get_by_id(&self, kind: SourceKind, id: i64) -> StorageResult<Option<Item>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_columns(kind),
            table(kind)
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let mut rows = stmt
            .query_map(params![id], |row| item_from_row(kind, row))
            .map_err(query_err)?;
        match rows.next() {
            Some(item) => Ok(Some(item.map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn recent_page(
        &self,
        kind: SourceKind,
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
    ) -> StorageResult<Vec<Item>> {
        let conn = self.conn.lock().await;
        Self::page_query(&conn, kind, ts_column(kind), since, start, num)
    }

    async fn popular_page(
        &self,
        kind: SourceKind,
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
    ) -> StorageResult<Vec<Item>> {
        let conn = self.conn.lock().await;
        Self::page_query(&conn, kind, pop_column(kind), since, start, num)
    }

    async fn has_embeddings(&self, kind: SourceKind) -> StorageResult<bool> {
        if kind == SourceKind::Social {
            return Ok(false);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE embedding IS NOT NULL)",
            table(kind)
        );
        conn.query_row(&sql, [], |row| row.get::<_, bool>(0))
            .map_err(query_err)
    }

    async fn nearest(
        &self,
        kind: SourceKind,
        query: &[f32],
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<(Item, f32)>> {
        if kind == SourceKind::Social {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let since_epoch = since.map(to_epoch).unwrap_or(i64::MIN);
        let sql = format!(
            "SELECT {} FROM {} WHERE embedding IS NOT NULL AND {} >= ?1",
            select_columns(kind),
            table(kind),
            ts_column(kind),
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params![since_epoch], |row| item_from_row(kind, row))
            .map_err(query_err)?;

        let mut scored: Vec<(Item, f32)> = Vec::new();
        for item in rows {
            let item = item.map_err(query_err)?;
            if let Some(embedding) = item.embedding() {
                let dist = cosine_distance(query, embedding);
                scored.push((item, dist));
            }
        }
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn keyword_page(
        &self,
        kind: SourceKind,
        terms: &[String],
        since: Option<DateTime<Utc>>,
        start: usize,
        num: usize,
        order: OrderField,
    ) -> StorageResult<Vec<Item>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let fields = search_columns(kind);

        // one AND-ed clause per term, each an OR across the searchable fields
        let mut clauses = Vec::with_capacity(terms.len());
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();
        bind.push(rusqlite::types::Value::Integer(
            since.map(to_epoch).unwrap_or(i64::MIN),
        ));
        for term in terms {
            let pattern = format!("%{}%", term.to_lowercase());
            let ors: Vec<String> = fields
                .iter()
                .map(|f| {
                    bind.push(rusqlite::types::Value::Text(pattern.clone()));
                    format!("LOWER({}) LIKE ?{}", f, bind.len())
                })
                .collect();
            clauses.push(format!("({})", ors.join(" OR ")));
        }
        let order_col = match order {
            OrderField::Timestamp => ts_column(kind),
            OrderField::Popularity => pop_column(kind),
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} >= ?1 AND {} ORDER BY {} DESC LIMIT {} OFFSET {}",
            select_columns(kind),
            table(kind),
            ts_column(kind),
            clauses.join(" AND "),
            order_col,
            num,
            start,
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(bind.iter()), |row| item_from_row(kind, row))
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    async fn count(&self, kind: SourceKind) -> StorageResult<usize> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT COUNT(*) FROM {}", table(kind));
        conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(query_err)
    }

    async fn bump_popularity(
        &self,
        kind: SourceKind,
        natural_key: &str,
        delta: i64,
    ) -> StorageResult<bool> {
        if delta <= 0 {
            return Ok(false);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "UPDATE {table} SET {pop} = {pop} + ?2 WHERE {key} = ?1",
            table = table(kind),
            pop = pop_column(kind),
            key = key_column(kind),
        );
        let changed = conn
            .execute(&sql, params![natural_key, delta])
            .map_err(query_err)?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn paper(url: &str, title: &str, published: DateTime<Utc>, embedding: Option<Vec<f32>>) -> Item {
        Item::Paper(PaperItem {
            id: None,
            url: url.to_string(),
            version: 1,
            title: title.to_string(),
            abstract_text: format!("Abstract for {}", title),
            authors: "A. Author, B. Author".to_string(),
            pdf_url: None,
            journal: None,
            doi: None,
            tags: "cs.LG".to_string(),
            published,
            popularity: 0,
            embedding,
        })
    }

    fn repo(repo_id: &str, name: &str, stars: i64, updated_at: DateTime<Utc>) -> Item {
        Item::Repo(RepoItem {
            id: None,
            repo_id: repo_id.to_string(),
            name: name.to_string(),
            full_name: format!("owner/{}", name),
            description: "A test repository".to_string(),
            html_url: format!("https://github.test/owner/{}", name),
            clone_url: format!("https://github.test/owner/{}.git", name),
            stars,
            forks: 1,
            language: "Rust".to_string(),
            topics: "testing".to_string(),
            readme: "readme text".to_string(),
            created_at: updated_at - Duration::days(100),
            updated_at,
            embedding: None,
        })
    }

    async fn fresh_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_batch_deduplicates_by_natural_key() {
        let store = fresh_store().await;
        let now = Utc::now();
        let items = vec![
            paper("http://arxiv.test/abs/1v1", "One", now, None),
            paper("http://arxiv.test/abs/2v1", "Two", now, None),
        ];
        assert_eq!(store.insert_batch(&items).await.unwrap(), 2);
        // re-inserting the same keys is a no-op
        assert_eq!(store.insert_batch(&items).await.unwrap(), 0);
        assert_eq!(store.count(SourceKind::Paper).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_existing_keys_partitions_known_and_new() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[paper("http://arxiv.test/abs/1v1", "One", now, None)])
            .await
            .unwrap();
        let keys = vec![
            "http://arxiv.test/abs/1v1".to_string(),
            "http://arxiv.test/abs/9v1".to_string(),
        ];
        let known = store.existing_keys(SourceKind::Paper, &keys).await.unwrap();
        assert!(known.contains("http://arxiv.test/abs/1v1"));
        assert!(!known.contains("http://arxiv.test/abs/9v1"));
    }

    #[tokio::test]
    async fn test_recent_page_orders_newest_first() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[
                paper("http://arxiv.test/abs/old", "Old", now - Duration::days(5), None),
                paper("http://arxiv.test/abs/new", "New", now, None),
            ])
            .await
            .unwrap();
        let page = store
            .recent_page(SourceKind::Paper, None, 0, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].label(), "New");

        // since filter excludes the older row
        let filtered = store
            .recent_page(SourceKind::Paper, Some(now - Duration::days(1)), 0, 10)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_cosine_distance() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[
                paper("u1", "Close", now, Some(vec![1.0, 0.0, 0.0])),
                paper("u2", "Far", now, Some(vec![0.0, 1.0, 0.0])),
                paper("u3", "NoEmbedding", now, None),
            ])
            .await
            .unwrap();
        let results = store
            .nearest(SourceKind::Paper, &[1.0, 0.0, 0.0], None, 10)
            .await
            .unwrap();
        // the un-embedded row is skipped
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.label(), "Close");
        assert!(results[0].1 <= results[1].1);
    }

    #[tokio::test]
    async fn test_embedding_blob_round_trip() {
        let store = fresh_store().await;
        let now = Utc::now();
        let vector = vec![0.25_f32, -1.5, 3.75];
        store
            .insert_batch(&[paper("u1", "Embedded", now, Some(vector.clone()))])
            .await
            .unwrap();
        let item = store.get_by_id(SourceKind::Paper, 1).await.unwrap().unwrap();
        assert_eq!(item.embedding().unwrap(), vector.as_slice());
    }

    #[tokio::test]
    async fn test_keyword_page_ands_terms_across_fields() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[
                paper("u1", "Deep Learning Survey", now, None),
                paper("u2", "Quantum Computing", now, None),
            ])
            .await
            .unwrap();
        let hits = store
            .keyword_page(
                SourceKind::Paper,
                &["deep".to_string(), "survey".to_string()],
                None,
                0,
                10,
                OrderField::Timestamp,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Deep Learning Survey");

        // a term matching nothing empties the result
        let none = store
            .keyword_page(
                SourceKind::Paper,
                &["deep".to_string(), "quantum".to_string()],
                None,
                0,
                10,
                OrderField::Timestamp,
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_page_since_bound_excludes_older_rows() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[
                paper("u1", "Deep Learning Survey", now, None),
                paper("u2", "Deep Learning Primer", now - Duration::days(10), None),
            ])
            .await
            .unwrap();
        let hits = store
            .keyword_page(
                SourceKind::Paper,
                &["deep".to_string()],
                Some(now - Duration::days(1)),
                0,
                10,
                OrderField::Timestamp,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label(), "Deep Learning Survey");
    }

    #[tokio::test]
    async fn test_refresh_repo_activity_never_regresses() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[repo("42", "widget", 500, now)])
            .await
            .unwrap();

        // a stale observation with fewer stars and an older timestamp
        let updated = store
            .refresh_repo_activity("42", 300, 7, now - Duration::days(30))
            .await
            .unwrap();
        assert!(updated);
        let item = store
            .get_by_id(SourceKind::Repository, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.popularity_score(), 500);
        assert_eq!(item.timestamp().timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_popular_page_orders_by_stars() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[
                repo("1", "small", 10, now),
                repo("2", "big", 9000, now),
            ])
            .await
            .unwrap();
        let page = store
            .popular_page(SourceKind::Repository, None, 0, 10)
            .await
            .unwrap();
        assert_eq!(page[0].label(), "owner/big");
    }

    #[tokio::test]
    async fn test_bump_popularity() {
        let store = fresh_store().await;
        let now = Utc::now();
        store
            .insert_batch(&[paper("u1", "Hot", now, None)])
            .await
            .unwrap();
        assert!(store
            .bump_popularity(SourceKind::Paper, "u1", 5)
            .await
            .unwrap());
        // non-positive deltas are ignored
        assert!(!store
            .bump_popularity(SourceKind::Paper, "u1", 0)
            .await
            .unwrap());
        assert!(!store
            .bump_popularity(SourceKind::Paper, "missing", 5)
            .await
            .unwrap());
        let item = store.get_by_id(SourceKind::Paper, 1).await.unwrap().unwrap();
        assert_eq!(item.popularity_score(), 5);
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.initialize().await.unwrap();
            store
                .insert_batch(&[paper("u1", "Persisted", Utc::now(), Some(vec![0.5, 0.5]))])
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.count(SourceKind::Paper).await.unwrap(), 1);
        let item = store.get_by_id(SourceKind::Paper, 1).await.unwrap().unwrap();
        assert_eq!(item.label(), "Persisted");
        assert_eq!(item.embedding(), Some(&[0.5, 0.5][..]));
    }

    #[tokio::test]
    async fn test_has_embeddings_reflects_stored_state() {
        let store = fresh_store().await;
        assert!(!store.has_embeddings(SourceKind::Paper).await.unwrap());
        store
            .insert_batch(&[paper("u1", "Embedded", Utc::now(), Some(vec![1.0, 0.0]))])
            .await
            .unwrap();
        assert!(store.has_embeddings(SourceKind::Paper).await.unwrap());
        assert!(!store.has_embeddings(SourceKind::Social).await.unwrap());
    }
}
