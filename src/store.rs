//! The index store: sources, chunks and their embeddings in one SQLite file.
//!
//! Every write that touches a source's chunks runs inside a single
//! transaction, so readers see either the previous chunk set of a source or
//! the complete new one. Deleting a source deletes its chunks in the same
//! transaction; the `ON DELETE CASCADE` foreign key backs that up, so no
//! chunk row ever outlives its source row.
//!
//! Vectors are stored as little-endian `f32` BLOBs (see
//! [`crate::embedding::vec_to_blob`]); the `meta` table records which
//! embedding model and dimensionality produced them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::SourceConfig;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{ContextError, Result, SCHEMA_VERSION};
use crate::migrate;
use crate::models::{Chunk, IndexRecord};

/// Counts written to a source row on each indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceStats {
    pub file_count: usize,
    pub chunk_count: usize,
}

/// Model and dimensionality the stored vectors were produced with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingMeta {
    pub model: String,
    pub dims: usize,
}

pub struct IndexStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl IndexStore {
    /// Create the store file and schema if absent. Idempotent.
    pub async fn initialize(path: &Path) -> Result<Self> {
        let pool = db::connect(path, true).await?;
        migrate::initialize(&pool).await?;
        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.check_schema().await?;
        Ok(store)
    }

    /// Open an existing store.
    ///
    /// Fails with [`ContextError::NotInitialized`] when the file does not
    /// exist and [`ContextError::SchemaMismatch`] when its schema is missing
    /// or from another version.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ContextError::NotInitialized(path.to_path_buf()));
        }
        let pool = db::connect(path, false).await?;
        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.check_schema().await?;
        Ok(store)
    }

    async fn check_schema(&self) -> Result<()> {
        let found = migrate::schema_version(&self.pool).await?;
        if found != Some(SCHEMA_VERSION) {
            return Err(ContextError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    // ============ Writes ============

    /// Insert or refresh a source row.
    pub async fn upsert_source(&self, source: &SourceConfig, stats: SourceStats) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_source_row(&mut tx, source, stats).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace every chunk of `source_id` with `chunks`, atomically.
    pub async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_chunk_rows(&mut tx, source_id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Refresh the source row and swap in its new chunk set in one
    /// transaction. On any failure the previous state is kept.
    pub async fn replace_source(
        &self,
        source: &SourceConfig,
        stats: SourceStats,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_source_row(&mut tx, source, stats).await?;
        replace_chunk_rows(&mut tx, &source.id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a source and all of its chunks. Returns whether a row existed.
    pub async fn delete_source(&self, source_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Clear every stored vector and record a new embedding model, in one
    /// transaction. Rows stay in place until their source is re-indexed;
    /// chunks without a vector are not searchable.
    pub async fn reset_embeddings(&self, meta: &EmbeddingMeta) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE chunks SET embedding = NULL")
            .execute(&mut *tx)
            .await?;
        write_meta(&mut tx, "embedding_model", &meta.model).await?;
        write_meta(&mut tx, "embedding_dims", &meta.dims.to_string()).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_embedding_meta(&self, meta: &EmbeddingMeta) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_meta(&mut tx, "embedding_model", &meta.model).await?;
        write_meta(&mut tx, "embedding_dims", &meta.dims.to_string()).await?;
        tx.commit().await?;
        Ok(())
    }

    // ============ Reads ============

    pub async fn embedding_meta(&self) -> Result<Option<EmbeddingMeta>> {
        let rows = sqlx::query(
            "SELECT key, value FROM meta WHERE key IN ('embedding_model', 'embedding_dims')",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut model = None;
        let mut dims = None;
        for row in &rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "embedding_model" => model = Some(value),
                "embedding_dims" => dims = value.parse().ok(),
                _ => {}
            }
        }

        Ok(match (model, dims) {
            (Some(model), Some(dims)) => Some(EmbeddingMeta { model, dims }),
            _ => None,
        })
    }

    pub async fn count_chunks(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// All chunks, optionally restricted to `source_ids`, ordered by id.
    pub async fn list_chunks(&self, source_ids: Option<&[String]>) -> Result<Vec<Chunk>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, source_id, file_path, content, start_line, end_line, tokens, embedding FROM chunks",
        );
        if let Some(ids) = source_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" WHERE source_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    /// Existing chunks of one source keyed by id, for embedding reuse.
    pub async fn existing_chunks(&self, source_id: &str) -> Result<HashMap<String, Chunk>> {
        let ids = [source_id.to_string()];
        let chunks = self.list_chunks(Some(&ids)).await?;
        Ok(chunks.into_iter().map(|c| (c.id.clone(), c)).collect())
    }

    /// Per-source summaries, ordered by source id.
    pub async fn source_records(&self) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            "SELECT id, path, file_count, chunk_count, indexed_at FROM sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let indexed_at: Option<i64> = row.get("indexed_at");
                IndexRecord {
                    source_id: row.get("id"),
                    path: row.get("path"),
                    file_count: row.get("file_count"),
                    chunk_count: row.get("chunk_count"),
                    indexed_at: indexed_at.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
                }
            })
            .collect())
    }

    pub async fn source_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

async fn upsert_source_row(
    conn: &mut SqliteConnection,
    source: &SourceConfig,
    stats: SourceStats,
) -> Result<()> {
    let config_json = serde_json::to_string(source).unwrap_or_else(|_| "{}".to_string());
    sqlx::query(
        r#"
        INSERT INTO sources (id, path, config, file_count, chunk_count, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            config = excluded.config,
            file_count = excluded.file_count,
            chunk_count = excluded.chunk_count,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&source.id)
    .bind(source.path.to_string_lossy().to_string())
    .bind(config_json)
    .bind(stats.file_count as i64)
    .bind(stats.chunk_count as i64)
    .bind(Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_chunk_rows(
    conn: &mut SqliteConnection,
    source_id: &str,
    chunks: &[Chunk],
) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE source_id = ?")
        .bind(source_id)
        .execute(&mut *conn)
        .await?;

    let now = Utc::now().timestamp();
    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_id, file_path, content, start_line, end_line, tokens, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(source_id)
        .bind(&chunk.file_path)
        .bind(&chunk.content)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .bind(chunk.tokens as i64)
        .bind(chunk.embedding.as_deref().map(vec_to_blob))
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_meta(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let start_line: i64 = row.get("start_line");
    let end_line: i64 = row.get("end_line");
    let tokens: i64 = row.get("tokens");
    let blob: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        source_id: row.get("source_id"),
        file_path: row.get("file_path"),
        content: row.get("content"),
        start_line: start_line as usize,
        end_line: end_line as usize,
        tokens: tokens as usize,
        embedding: blob.map(|b| blob_to_vec(&b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use tempfile::TempDir;

    fn chunks_for(source_id: &str, file: &str, n_lines: usize) -> Vec<Chunk> {
        let text: String = (0..n_lines).map(|i| format!("line number {}\n", i)).collect();
        chunk_text(source_id, file, &text, 40, 5)
            .into_iter()
            .map(|mut c| {
                c.embedding = Some(vec![c.start_line as f32, 1.0, 0.5]);
                c
            })
            .collect()
    }

    async fn raw_count(store: &IndexStore, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&store.pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".ctx/index.db");
        IndexStore::initialize(&path).await.unwrap().close().await;
        let store = IndexStore::initialize(&path).await.unwrap();
        assert_eq!(store.count_chunks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_missing_store() {
        let tmp = TempDir::new().unwrap();
        let result = IndexStore::open(&tmp.path().join("nope.db")).await;
        assert!(matches!(result, Err(ContextError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_foreign_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("other.db");
        let pool = db::connect(&path, true).await.unwrap();
        sqlx::query("CREATE TABLE unrelated (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let result = IndexStore::open(&path).await;
        assert!(matches!(
            result,
            Err(ContextError::SchemaMismatch { found: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_replace_source_and_list() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        let source = SourceConfig::new("src", "src");
        let chunks = chunks_for("src", "a.rs", 30);
        let stats = SourceStats {
            file_count: 1,
            chunk_count: chunks.len(),
        };
        store.replace_source(&source, stats, &chunks).await.unwrap();

        let listed = store.list_chunks(None).await.unwrap();
        assert_eq!(listed.len(), chunks.len());
        let mut ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        let sorted = {
            let mut s = ids.clone();
            s.sort();
            s
        };
        assert_eq!(ids, sorted);
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
        assert!(listed.iter().all(|c| c.embedding.as_ref().map(|v| v.len()) == Some(3)));

        let records = store.source_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chunk_count, chunks.len() as i64);
        assert!(records[0].indexed_at.is_some());
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        let source = SourceConfig::new("src", "src");
        store
            .replace_source(&source, SourceStats::default(), &chunks_for("src", "a.rs", 60))
            .await
            .unwrap();
        let second = chunks_for("src", "b.rs", 5);
        store
            .replace_source(&source, SourceStats::default(), &second)
            .await
            .unwrap();

        let listed = store.list_chunks(None).await.unwrap();
        assert_eq!(listed.len(), second.len());
        assert!(listed.iter().all(|c| c.file_path == "b.rs"));
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_state() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        let source = SourceConfig::new("src", "src");
        let original = chunks_for("src", "a.rs", 30);
        store
            .replace_source(&source, SourceStats::default(), &original)
            .await
            .unwrap();

        // Duplicate ids violate the primary key half-way through the insert.
        let mut broken = chunks_for("src", "b.rs", 30);
        broken.push(broken[0].clone());
        assert!(store
            .replace_source(&source, SourceStats::default(), &broken)
            .await
            .is_err());

        let listed = store.list_chunks(None).await.unwrap();
        assert_eq!(listed.len(), original.len());
        assert!(listed.iter().all(|c| c.file_path == "a.rs"));
    }

    #[tokio::test]
    async fn test_delete_source_cascades() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        let src = SourceConfig::new("src", "src");
        let docs = SourceConfig::new("docs", "docs");
        store
            .replace_source(&src, SourceStats::default(), &chunks_for("src", "a.rs", 30))
            .await
            .unwrap();
        store
            .replace_source(&docs, SourceStats::default(), &chunks_for("docs", "r.md", 30))
            .await
            .unwrap();

        assert!(store.delete_source("src").await.unwrap());
        assert!(!store.delete_source("src").await.unwrap());

        let orphans = raw_count(
            &store,
            "SELECT COUNT(*) FROM chunks WHERE source_id NOT IN (SELECT id FROM sources)",
        )
        .await;
        assert_eq!(orphans, 0);
        assert_eq!(
            raw_count(&store, "SELECT COUNT(*) FROM chunks WHERE source_id = 'src'").await,
            0
        );
        assert!(store.count_chunks().await.unwrap() > 0);
        assert_eq!(store.source_ids().await.unwrap(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_foreign_key_rejects_orphan_insert() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        let result = store
            .replace_chunks("ghost", &chunks_for("ghost", "a.rs", 3))
            .await;
        assert!(result.is_err());
        assert_eq!(store.count_chunks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_chunks_source_filter() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        store
            .replace_source(
                &SourceConfig::new("src", "src"),
                SourceStats::default(),
                &chunks_for("src", "a.rs", 10),
            )
            .await
            .unwrap();
        store
            .replace_source(
                &SourceConfig::new("docs", "docs"),
                SourceStats::default(),
                &chunks_for("docs", "r.md", 10),
            )
            .await
            .unwrap();

        let only_docs = store.list_chunks(Some(&["docs".to_string()])).await.unwrap();
        assert!(!only_docs.is_empty());
        assert!(only_docs.iter().all(|c| c.source_id == "docs"));
        assert!(store.list_chunks(Some(&[])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_meta_roundtrip_and_reset() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::initialize(&tmp.path().join("index.db")).await.unwrap();
        assert_eq!(store.embedding_meta().await.unwrap(), None);

        let meta = EmbeddingMeta {
            model: "hash:fnv1a-256".to_string(),
            dims: 256,
        };
        store.set_embedding_meta(&meta).await.unwrap();
        assert_eq!(store.embedding_meta().await.unwrap(), Some(meta));

        store
            .replace_source(
                &SourceConfig::new("src", "src"),
                SourceStats::default(),
                &chunks_for("src", "a.rs", 10),
            )
            .await
            .unwrap();
        let before = store.count_chunks().await.unwrap();
        assert!(before > 0);
        let next = EmbeddingMeta {
            model: "openai:text-embedding-3-small".to_string(),
            dims: 1536,
        };
        store.reset_embeddings(&next).await.unwrap();
        assert_eq!(store.count_chunks().await.unwrap(), before);
        assert_eq!(store.source_ids().await.unwrap(), vec!["src".to_string()]);
        let listed = store.list_chunks(None).await.unwrap();
        assert!(listed.iter().all(|c| c.embedding.is_none()));
        assert_eq!(store.embedding_meta().await.unwrap(), Some(next));
    }
}
