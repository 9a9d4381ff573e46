//! Durable record store with a full-text index and a vector index.
//!
//! Every write touches the primary table and both indexes inside one transaction, so a
//! record is either visible everywhere or nowhere. The primary table owns a stable integer
//! `seq` that doubles as the rowid of the FTS5 table and of the sqlite-vec table; both indexes
//! also carry the record id and content type as auxiliary columns.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::memory::core::config::StorageConfig;
use crate::memory::core::content_type::ContentType;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::{MemoryRecord, validate_vector};
use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Largest `k` accepted by the sqlite-vec KNN operator.
pub const MAX_INDEX_K: usize = 4096;

/// One hit from either index, best first. Higher `score` is better.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexHit {
    /// Matched record.
    pub id: MemoryId,
    /// Negated distance (vector) or negated bm25 (keyword).
    pub score: f64,
}

/// Result of attaching an embedding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingUpdate {
    /// The vector index changed.
    Updated,
    /// The record already carried this exact vector.
    Unchanged,
}

/// Row counts across the primary table and both indexes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Records in the primary table.
    pub records: u64,
    /// Records that carry an embedding.
    pub embedded: u64,
    /// Entries in the full-text index.
    pub keyword_entries: u64,
    /// Entries in the vector index.
    pub vector_entries: u64,
}

/// Storage abstraction for memory records.
pub trait MemoryStore: Send + Sync {
    /// Persist a record and index it. Re-inserting an id replaces its content, keywords and
    /// embedding.
    ///
    /// # Errors
    /// Returns a validation error for a bad record or a changed content type, or a storage error.
    fn insert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>>;

    /// Attach or replace a record's embedding.
    ///
    /// # Errors
    /// Returns [`MemoryError::NotFound`] for an unknown id and a validation error for a vector
    /// of the wrong dimension.
    fn update_embedding(
        &self,
        id: MemoryId,
        embedding: Vec<f32>,
    ) -> StoreFuture<'_, MemoryResult<EmbeddingUpdate>>;

    /// Load records by id, in the order requested. Unknown ids are skipped.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_many(&self, ids: Vec<MemoryId>) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>>;

    /// Nearest neighbours of `vector`, closest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn search_vector(
        &self,
        vector: Vec<f32>,
        k: usize,
        content_type: Option<ContentType>,
    ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>>;

    /// Full-text matches for `query`, best first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn search_keyword(
        &self,
        query: &str,
        k: usize,
        content_type: Option<ContentType>,
    ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>>;

    /// Remove a record from the table and both indexes. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>>;

    /// Oldest records still waiting for an embedding.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn without_embedding(&self, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>>;

    /// Row counts.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn stats(&self) -> StoreFuture<'_, MemoryResult<StoreStats>>;
}

/// `SQLite` implementation backed by FTS5 and sqlite-vec.
pub struct SqliteMemoryStore {
    writer: Connection,
    reader: Connection,
    ndims: usize,
}

impl SqliteMemoryStore {
    /// Open (or create) the store.
    ///
    /// File databases get a dedicated writer connection plus a reader connection in WAL mode.
    /// An in-memory database shares a single connection.
    ///
    /// # Errors
    /// Returns [`MemoryError::SqliteVecUnavailable`] if the vector extension cannot be loaded,
    /// or a storage error if the database cannot be opened.
    pub async fn open(storage: &StorageConfig, ndims: usize) -> MemoryResult<Self> {
        if ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        init_sqlite_vec_extension();

        let in_memory = storage.is_in_memory();
        let busy_timeout = Duration::from_millis(storage.busy_timeout_ms);
        let writer = if in_memory {
            Connection::open_in_memory().await?
        } else {
            Connection::open(&storage.sqlite_path).await?
        };

        let vec_version = writer
            .call(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                if !in_memory {
                    conn.execute_batch(
                        "PRAGMA journal_mode = WAL;
                         PRAGMA synchronous = NORMAL;",
                    )?;
                }
                Ok(conn
                    .query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                    .ok())
            })
            .await?;
        let Some(vec_version) = vec_version else {
            return Err(MemoryError::SqliteVecUnavailable);
        };

        writer
            .call(move |conn| {
                conn.execute_batch(&schema_sql(ndims))?;
                Ok(())
            })
            .await?;

        let reader = if in_memory {
            writer.clone()
        } else {
            let reader = Connection::open(&storage.sqlite_path).await?;
            reader
                .call(move |conn| {
                    conn.busy_timeout(busy_timeout)?;
                    Ok(())
                })
                .await?;
            reader
        };

        info!(
            path = %storage.sqlite_path.display(),
            ndims,
            sqlite_vec = %vec_version,
            "memory store opened"
        );

        Ok(Self {
            writer,
            reader,
            ndims,
        })
    }

    /// Embedding dimension of the vector index.
    #[must_use]
    pub const fn ndims(&self) -> usize {
        self.ndims
    }
}

fn schema_sql(ndims: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS memories (
            seq INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL,
            keywords TEXT NOT NULL,
            embedding TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS memories_content_type ON memories (content_type);
        CREATE INDEX IF NOT EXISTS memories_pending_embedding
            ON memories (created_at) WHERE embedding IS NULL;
        CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
            content,
            keywords,
            content_type UNINDEXED,
            memory_id UNINDEXED
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS memory_vec USING vec0(
            content_type TEXT PARTITION KEY,
            embedding float[{ndims}],
            +memory_id TEXT
        );"
    )
}

/// Column values prepared outside the connection thread.
#[derive(Clone)]
struct RecordRow {
    id: String,
    content: String,
    content_type: &'static str,
    keywords_json: String,
    keywords_text: String,
    embedding_json: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RecordRow {
    fn from_record(record: &MemoryRecord) -> MemoryResult<Self> {
        Ok(Self {
            id: record.id.to_string(),
            content: record.content.clone(),
            content_type: record.content_type.as_str(),
            keywords_json: serde_json::to_string(&record.keywords)?,
            keywords_text: record
                .keywords
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            embedding_json: record
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_at: record.created_at.timestamp_millis(),
            updated_at: record.updated_at.timestamp_millis(),
        })
    }
}

/// Raw columns as read back from `memories`.
struct StoredRow {
    id: MemoryId,
    content: String,
    content_type: String,
    keywords: String,
    embedding: Option<String>,
    created_at: i64,
    updated_at: i64,
}

const SELECT_COLUMNS: &str =
    "id, content, content_type, keywords, embedding, created_at, updated_at";

impl StoredRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            content_type: row.get(2)?,
            keywords: row.get(3)?,
            embedding: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> MemoryResult<MemoryRecord> {
        let content_type = ContentType::from_str(&self.content_type)
            .map_err(|err| MemoryError::Corrupt(format!("{}: {err}", self.id)))?;
        let keywords: BTreeSet<String> = serde_json::from_str(&self.keywords)?;
        let embedding = self
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;
        Ok(MemoryRecord {
            id: self.id,
            content: self.content,
            content_type,
            keywords,
            embedding,
            created_at: from_millis(self.id, self.created_at)?,
            updated_at: from_millis(self.id, self.updated_at)?,
        })
    }
}

fn from_millis(id: MemoryId, millis: i64) -> MemoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| MemoryError::Corrupt(format!("{id}: timestamp {millis} out of range")))
}

enum InsertOutcome {
    Stored,
    ContentTypeChanged(String),
}

/// Run a storage call, retrying once if the database was busy or locked.
async fn with_retry<T, F, Fut>(operation: &'static str, mut attempt: F) -> MemoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, tokio_rusqlite::Error>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(err) => {
            let err = MemoryError::from(err);
            if !err.is_transient() {
                return Err(err);
            }
            warn!(operation, error = %err, "transient storage error, retrying once");
            Ok(attempt().await?)
        }
    }
}

/// Turn free text into an FTS5 query: each alphanumeric token quoted, joined with OR.
///
/// Returns `None` when nothing searchable remains.
#[must_use]
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn clamp_k(k: usize) -> i64 {
    i64::try_from(k.min(MAX_INDEX_K)).unwrap_or(0)
}

fn millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

impl MemoryStore for SqliteMemoryStore {
    fn insert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>> {
        Box::pin(async move {
            record.validate(self.ndims)?;
            let row = RecordRow::from_record(&record)?;

            let outcome = with_retry("insert", || {
                let row = row.clone();
                self.writer.call(move |conn| {
                    let tx = conn.transaction()?;
                    let existing: Option<(i64, String)> = tx
                        .query_row(
                            "SELECT seq, content_type FROM memories WHERE id = ?1",
                            [&row.id],
                            |r| Ok((r.get(0)?, r.get(1)?)),
                        )
                        .optional()?;

                    let seq = match existing {
                        Some((_, stored)) if stored != row.content_type => {
                            return Ok(InsertOutcome::ContentTypeChanged(stored));
                        }
                        Some((seq, _)) => {
                            tx.execute(
                                "UPDATE memories
                                 SET content = ?2, keywords = ?3, embedding = ?4, updated_at = ?5
                                 WHERE seq = ?1",
                                params![
                                    seq,
                                    row.content,
                                    row.keywords_json,
                                    row.embedding_json,
                                    row.updated_at
                                ],
                            )?;
                            tx.execute("DELETE FROM memory_fts WHERE rowid = ?1", [seq])?;
                            tx.execute("DELETE FROM memory_vec WHERE rowid = ?1", [seq])?;
                            seq
                        }
                        None => {
                            tx.execute(
                                "INSERT INTO memories
                                 (id, content, content_type, keywords, embedding,
                                  created_at, updated_at)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                                params![
                                    row.id,
                                    row.content,
                                    row.content_type,
                                    row.keywords_json,
                                    row.embedding_json,
                                    row.created_at,
                                    row.updated_at
                                ],
                            )?;
                            tx.last_insert_rowid()
                        }
                    };

                    tx.execute(
                        "INSERT INTO memory_fts (rowid, content, keywords, content_type, memory_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![seq, row.content, row.keywords_text, row.content_type, row.id],
                    )?;
                    if let Some(embedding) = &row.embedding_json {
                        tx.execute(
                            "INSERT INTO memory_vec (rowid, content_type, embedding, memory_id)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![seq, row.content_type, embedding, row.id],
                        )?;
                    }
                    tx.commit()?;
                    Ok(InsertOutcome::Stored)
                })
            })
            .await?;

            match outcome {
                InsertOutcome::Stored => {
                    debug!(id = %record.id, content_type = %record.content_type, "record stored");
                    Ok(record.id)
                }
                InsertOutcome::ContentTypeChanged(stored) => Err(MemoryError::Validation(
                    format!(
                        "record {} is stored as {stored}, content type cannot change",
                        record.id
                    ),
                )),
            }
        })
    }

    fn update_embedding(
        &self,
        id: MemoryId,
        embedding: Vec<f32>,
    ) -> StoreFuture<'_, MemoryResult<EmbeddingUpdate>> {
        Box::pin(async move {
            validate_vector(&embedding, self.ndims)?;
            let embedding_json = serde_json::to_string(&embedding)?;

            let update = with_retry("update_embedding", || {
                let embedding_json = embedding_json.clone();
                self.writer.call(move |conn| {
                    let tx = conn.transaction()?;
                    let found: Option<(i64, String, Option<String>)> = tx
                        .query_row(
                            "SELECT seq, content_type, embedding FROM memories WHERE id = ?1",
                            [id],
                            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                        )
                        .optional()?;

                    let Some((seq, content_type, current)) = found else {
                        return Ok(None);
                    };
                    if current.as_deref() == Some(embedding_json.as_str()) {
                        return Ok(Some(EmbeddingUpdate::Unchanged));
                    }

                    tx.execute(
                        "UPDATE memories SET embedding = ?2, updated_at = ?3 WHERE seq = ?1",
                        params![seq, embedding_json, millis_now()],
                    )?;
                    tx.execute("DELETE FROM memory_vec WHERE rowid = ?1", [seq])?;
                    tx.execute(
                        "INSERT INTO memory_vec (rowid, content_type, embedding, memory_id)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![seq, content_type, embedding_json, id],
                    )?;
                    tx.commit()?;
                    Ok(Some(EmbeddingUpdate::Updated))
                })
            })
            .await?;

            let update = update.ok_or(MemoryError::NotFound(id))?;
            debug!(%id, ?update, "embedding attached");
            Ok(update)
        })
    }

    fn get_many(&self, ids: Vec<MemoryId>) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let keys: Vec<String> = ids.iter().map(ToString::to_string).collect();
            let rows = with_retry("get_many", || {
                let keys = keys.clone();
                self.reader.call(move |conn| {
                    let placeholders = (1..=keys.len())
                        .map(|i| format!("?{i}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM memories WHERE id IN ({placeholders})"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params_from_iter(keys.iter()), StoredRow::read)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
            })
            .await?;

            let mut by_id = HashMap::with_capacity(rows.len());
            for row in rows {
                let record = row.into_record()?;
                by_id.insert(record.id, record);
            }
            Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
        })
    }

    fn search_vector(
        &self,
        vector: Vec<f32>,
        k: usize,
        content_type: Option<ContentType>,
    ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>> {
        Box::pin(async move {
            if k == 0 {
                return Ok(Vec::new());
            }
            validate_vector(&vector, self.ndims)?;
            let vector_json = serde_json::to_string(&vector)?;
            let k = clamp_k(k);
            let filter = content_type.map(ContentType::as_str);

            let mut hits = with_retry("search_vector", || {
                let vector_json = vector_json.clone();
                self.reader.call(move |conn| {
                    let sql = if filter.is_some() {
                        "SELECT memory_id, distance FROM memory_vec
                         WHERE embedding MATCH ?1 AND k = ?2 AND content_type = ?3
                         ORDER BY distance"
                    } else {
                        "SELECT memory_id, distance FROM memory_vec
                         WHERE embedding MATCH ?1 AND k = ?2
                         ORDER BY distance"
                    };
                    let mut stmt = conn.prepare(sql)?;
                    let map = |row: &rusqlite::Row<'_>| {
                        Ok(IndexHit {
                            id: row.get(0)?,
                            score: -row.get::<_, f64>(1)?,
                        })
                    };
                    let hits = match filter {
                        Some(content_type) => stmt
                            .query_map(params![vector_json, k, content_type], map)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                        None => stmt
                            .query_map(params![vector_json, k], map)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    };
                    Ok(hits)
                })
            })
            .await?;

            // vec0 accepts only `ORDER BY distance`; equal distances are ordered by id here.
            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            debug!(hits = hits.len(), "vector search");
            Ok(hits)
        })
    }

    fn search_keyword(
        &self,
        query: &str,
        k: usize,
        content_type: Option<ContentType>,
    ) -> StoreFuture<'_, MemoryResult<Vec<IndexHit>>> {
        let fts = fts_query(query);
        Box::pin(async move {
            let Some(fts) = fts else {
                return Ok(Vec::new());
            };
            if k == 0 {
                return Ok(Vec::new());
            }
            let k = clamp_k(k);
            let filter = content_type.map(ContentType::as_str);

            let hits = with_retry("search_keyword", || {
                let fts = fts.clone();
                self.reader.call(move |conn| {
                    let sql = if filter.is_some() {
                        "SELECT memory_id, bm25(memory_fts) AS score FROM memory_fts
                         WHERE memory_fts MATCH ?1 AND content_type = ?3
                         ORDER BY score, memory_id
                         LIMIT ?2"
                    } else {
                        "SELECT memory_id, bm25(memory_fts) AS score FROM memory_fts
                         WHERE memory_fts MATCH ?1
                         ORDER BY score, memory_id
                         LIMIT ?2"
                    };
                    let mut stmt = conn.prepare(sql)?;
                    let map = |row: &rusqlite::Row<'_>| {
                        Ok(IndexHit {
                            id: row.get(0)?,
                            score: -row.get::<_, f64>(1)?,
                        })
                    };
                    let hits = match filter {
                        Some(content_type) => stmt
                            .query_map(params![fts, k, content_type], map)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                        None => stmt
                            .query_map(params![fts, k], map)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    };
                    Ok(hits)
                })
            })
            .await?;

            debug!(hits = hits.len(), "keyword search");
            Ok(hits)
        })
    }

    fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>> {
        Box::pin(async move {
            let deleted = with_retry("delete", || {
                self.writer.call(move |conn| {
                    let tx = conn.transaction()?;
                    let seq: Option<i64> = tx
                        .query_row("SELECT seq FROM memories WHERE id = ?1", [id], |r| r.get(0))
                        .optional()?;
                    let Some(seq) = seq else {
                        return Ok(false);
                    };
                    tx.execute("DELETE FROM memory_fts WHERE rowid = ?1", [seq])?;
                    tx.execute("DELETE FROM memory_vec WHERE rowid = ?1", [seq])?;
                    tx.execute("DELETE FROM memories WHERE seq = ?1", [seq])?;
                    tx.commit()?;
                    Ok(true)
                })
            })
            .await?;

            if deleted {
                debug!(%id, "record deleted");
            }
            Ok(deleted)
        })
    }

    fn without_embedding(&self, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = with_retry("without_embedding", || {
                self.reader.call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM memories
                         WHERE embedding IS NULL
                         ORDER BY created_at, seq
                         LIMIT ?1"
                    ))?;
                    let rows = stmt
                        .query_map([limit], StoredRow::read)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
            })
            .await?;

            rows.into_iter().map(StoredRow::into_record).collect()
        })
    }

    fn stats(&self) -> StoreFuture<'_, MemoryResult<StoreStats>> {
        Box::pin(async move {
            with_retry("stats", || {
                self.reader.call(|conn| {
                    let count = |sql: &str| -> rusqlite::Result<u64> {
                        let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
                        Ok(u64::try_from(n).unwrap_or(0))
                    };
                    Ok(StoreStats {
                        records: count("SELECT COUNT(*) FROM memories")?,
                        embedded: count(
                            "SELECT COUNT(*) FROM memories WHERE embedding IS NOT NULL",
                        )?,
                        keyword_entries: count("SELECT COUNT(*) FROM memory_fts")?,
                        vector_entries: count("SELECT COUNT(*) FROM memory_vec")?,
                    })
                })
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: usize = 4;

    async fn open_store() -> SqliteMemoryStore {
        match SqliteMemoryStore::open(&StorageConfig::in_memory(), DIMS).await {
            Ok(store) => store,
            Err(err) => panic!("store should open: {err}"),
        }
    }

    fn record(content: &str, content_type: ContentType, keywords: &[&str]) -> MemoryRecord {
        let keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        match MemoryRecord::new(content, content_type, keywords) {
            Ok(record) => record,
            Err(err) => panic!("record should build: {err}"),
        }
    }

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(
            fts_query("tokio::spawn panics!"),
            Some("\"tokio\" OR \"spawn\" OR \"panics\"".to_string())
        );
        assert_eq!(fts_query("  ::  \"*"), None);
    }

    #[tokio::test]
    async fn inserted_record_is_found_by_keyword() {
        let store = open_store().await;
        let stored = record(
            "borrow checker rejects the closure",
            ContentType::Error,
            &["borrow", "closure"],
        );
        let id = store.insert(stored.clone()).await.unwrap();

        let hits = store.search_keyword("closure", 10, None).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![id]);

        let loaded = store.get_many(vec![id]).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, stored.content);
        assert_eq!(loaded[0].keywords, stored.keywords);
        assert_eq!(loaded[0].content_type, ContentType::Error);
    }

    #[tokio::test]
    async fn keyword_search_tolerates_operator_characters() {
        let store = open_store().await;
        store
            .insert(record("use std::sync::Arc", ContentType::Code, &[]))
            .await
            .unwrap();

        let hits = store
            .search_keyword("Arc AND (NOT \"sync", 10, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search_keyword("::", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_search_orders_by_distance() {
        let store = open_store().await;
        let near = record("near", ContentType::Context, &[])
            .with_embedding(vec![1.0, 0.0, 0.0, 0.0]);
        let far = record("far", ContentType::Context, &[])
            .with_embedding(vec![0.0, 0.0, 0.0, 1.0]);
        let near_id = store.insert(near).await.unwrap();
        let far_id = store.insert(far).await.unwrap();

        let hits = store
            .search_vector(vec![0.9, 0.1, 0.0, 0.0], 10, None)
            .await
            .unwrap();
        assert_eq!(
            hits.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![near_id, far_id]
        );
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn equal_distances_are_ordered_by_id() {
        let store = open_store().await;
        let mut ids = Vec::new();
        for content in ["first twin", "second twin", "third twin"] {
            let twin = record(content, ContentType::Code, &[])
                .with_embedding(vec![0.0, 1.0, 0.0, 0.0]);
            ids.push(store.insert(twin).await.unwrap());
        }
        ids.sort();

        let hits = store
            .search_vector(vec![0.0, 1.0, 0.0, 0.0], 10, Some(ContentType::Code))
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), ids);
        assert!(hits.iter().all(|h| h.score == hits[0].score));
    }

    #[tokio::test]
    async fn content_type_filter_applies_to_both_indexes() {
        let store = open_store().await;
        let code = store
            .insert(
                record("retry the sqlite write", ContentType::Code, &[])
                    .with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .insert(
                record("retry the sqlite write later", ContentType::Decision, &[])
                    .with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
            )
            .await
            .unwrap();

        let keyword = store
            .search_keyword("sqlite", 10, Some(ContentType::Code))
            .await
            .unwrap();
        let vector = store
            .search_vector(vec![1.0, 0.0, 0.0, 0.0], 10, Some(ContentType::Code))
            .await
            .unwrap();
        assert_eq!(keyword.iter().map(|h| h.id).collect::<Vec<_>>(), vec![code]);
        assert_eq!(vector.iter().map(|h| h.id).collect::<Vec<_>>(), vec![code]);
    }

    #[tokio::test]
    async fn update_embedding_is_idempotent() {
        let store = open_store().await;
        let id = store
            .insert(record("pending vector", ContentType::Learning, &[]))
            .await
            .unwrap();
        assert!(store
            .search_vector(vec![0.0, 1.0, 0.0, 0.0], 5, None)
            .await
            .unwrap()
            .is_empty());

        let first = store
            .update_embedding(id, vec![0.0, 1.0, 0.0, 0.0])
            .await
            .unwrap();
        let second = store
            .update_embedding(id, vec![0.0, 1.0, 0.0, 0.0])
            .await
            .unwrap();
        assert_eq!(first, EmbeddingUpdate::Updated);
        assert_eq!(second, EmbeddingUpdate::Unchanged);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.vector_entries, 1);
        assert_eq!(stats.embedded, 1);
    }

    #[tokio::test]
    async fn update_embedding_rejects_unknown_id_and_bad_dimension() {
        let store = open_store().await;
        let missing = MemoryId::new();
        let err = store
            .update_embedding(missing, vec![0.0; DIMS])
            .await
            .err();
        assert!(matches!(err, Some(MemoryError::NotFound(id)) if id == missing));

        let id = store
            .insert(record("short vector", ContentType::Output, &[]))
            .await
            .unwrap();
        let err = store.update_embedding(id, vec![0.0; DIMS + 1]).await.err();
        assert!(matches!(err, Some(MemoryError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_removes_every_index_entry() {
        let store = open_store().await;
        let id = store
            .insert(
                record("drop me", ContentType::Output, &["drop"])
                    .with_embedding(vec![0.5, 0.5, 0.0, 0.0]),
            )
            .await
            .unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
        assert!(store.search_keyword("drop", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reinsert_replaces_content_but_not_content_type() {
        let store = open_store().await;
        let mut first = record("old wording", ContentType::Decision, &["old"]);
        let id = store.insert(first.clone()).await.unwrap();

        first.content = "new wording".to_string();
        first.keywords = ["new".to_string()].into_iter().collect();
        store.insert(first.clone()).await.unwrap();

        assert!(store.search_keyword("old", 5, None).await.unwrap().is_empty());
        assert_eq!(store.search_keyword("new", 5, None).await.unwrap().len(), 1);
        assert_eq!(store.stats().await.unwrap().keyword_entries, 1);

        first.content_type = ContentType::Code;
        let err = store.insert(first).await.err();
        assert!(matches!(err, Some(MemoryError::Validation(_))));
        assert_eq!(store.get_many(vec![id]).await.unwrap()[0].content, "new wording");
    }

    #[tokio::test]
    async fn without_embedding_lists_pending_records() {
        let store = open_store().await;
        let pending = store
            .insert(record("no vector yet", ContentType::Context, &[]))
            .await
            .unwrap();
        store
            .insert(
                record("has vector", ContentType::Context, &[])
                    .with_embedding(vec![0.0, 0.0, 1.0, 0.0]),
            )
            .await
            .unwrap();

        let batch = store.without_embedding(10).await.unwrap();
        assert_eq!(batch.iter().map(|r| r.id).collect::<Vec<_>>(), vec![pending]);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            sqlite_path: dir.path().join("memory.sqlite"),
            ..StorageConfig::default()
        };

        let id = {
            let store = SqliteMemoryStore::open(&config, DIMS).await.unwrap();
            store
                .insert(record("persisted across restarts", ContentType::Learning, &[]))
                .await
                .unwrap()
        };

        let store = SqliteMemoryStore::open(&config, DIMS).await.unwrap();
        let hits = store.search_keyword("restarts", 5, None).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![id]);
    }
}
