//! Persistent similarity index backed by SQLite.
//!
//! Stores one row per chunk plus a parallel vector table holding the
//! embedding BLOB, tagged with the source id so retrieval can reconstruct
//! provenance. The embedding provider identity (model name, dims) is
//! recorded in `index_meta` and verified before serving queries — the same
//! provider must be used at ingestion and query time.
//!
//! Rebuilds happen inside a single transaction (delete + insert + commit).
//! Under WAL journal mode readers opened before the commit keep the old
//! snapshot, so no query ever observes a partially rebuilt index.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::config::Config;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::PipelineError;
use crate::models::Chunk;

/// One stored chunk with its embedding, in insertion (rowid) order.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub rowid: i64,
    pub source_id: String,
    pub sequence_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Handle to an opened, schema-verified index.
#[derive(Debug)]
pub struct PolicyIndex {
    pool: SqlitePool,
}

impl PolicyIndex {
    /// Create the database file and schema. Idempotent.
    pub async fn init(config: &Config) -> Result<(), PipelineError> {
        let pool = connect(config, true).await?;
        run_migrations(&pool).await?;
        pool.close().await;
        Ok(())
    }

    /// Open an existing index for serving.
    ///
    /// Fails with [`PipelineError::IndexUnavailable`] when the database
    /// file is absent or the schema has not been initialized.
    pub async fn open(config: &Config) -> Result<Self, PipelineError> {
        if !config.index.path.exists() {
            return Err(PipelineError::IndexUnavailable(format!(
                "index database not found at {} (run `reglens init` and `reglens ingest`)",
                config.index.path.display()
            )));
        }

        let pool = connect(config, false).await?;

        let schema_ok: bool = sqlx::query_scalar(
            "SELECT COUNT(*) = 3 FROM sqlite_master WHERE type = 'table' \
             AND name IN ('policy_chunks', 'chunk_vectors', 'index_meta')",
        )
        .fetch_one(&pool)
        .await?;

        if !schema_ok {
            pool.close().await;
            return Err(PipelineError::IndexUnavailable(format!(
                "index schema missing or corrupt at {}",
                config.index.path.display()
            )));
        }

        Ok(Self { pool })
    }

    /// Replace the entire index contents atomically.
    ///
    /// `entries` pairs each chunk with its embedding. Insertion order is
    /// preserved as rowid order and serves as the retrieval tie-break.
    pub async fn rebuild(
        &self,
        entries: &[(Chunk, Vec<f32>)],
        model_name: &str,
        dims: usize,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM policy_chunks")
            .execute(&mut *tx)
            .await?;

        for (chunk, embedding) in entries {
            sqlx::query(
                "INSERT INTO policy_chunks (id, source_id, sequence_index, text, hash) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, source_id, embedding) VALUES (?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }

        let now = chrono::Utc::now().timestamp().to_string();
        for (key, value) in [
            ("embedding_model", model_name),
            ("embedding_dims", &dims.to_string()),
            ("rebuilt_at", &now),
        ] {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// All entries in insertion order.
    pub async fn entries(&self) -> Result<Vec<IndexEntry>, PipelineError> {
        let rows = sqlx::query(
            "SELECT c.rowid AS rowid, c.source_id, c.sequence_index, c.text, v.embedding \
             FROM policy_chunks c \
             JOIN chunk_vectors v ON v.chunk_id = c.id \
             ORDER BY c.rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    rowid: row.get("rowid"),
                    source_id: row.get("source_id"),
                    sequence_index: row.get("sequence_index"),
                    text: row.get("text"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    /// Number of indexed chunks.
    pub async fn len(&self) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM policy_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool, PipelineError> {
        Ok(self.len().await? == 0)
    }

    /// Verify the configured provider matches the one the index was built
    /// with. A silent mismatch would degrade retrieval quality without
    /// any visible failure.
    pub async fn verify_provider(
        &self,
        model_name: &str,
        dims: usize,
    ) -> Result<(), PipelineError> {
        let stored_model: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await?;
        let stored_dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_dims'")
                .fetch_optional(&self.pool)
                .await?;

        match (stored_model, stored_dims) {
            (Some(m), Some(d)) if m == model_name && d == dims.to_string() => Ok(()),
            (Some(m), Some(d)) => Err(PipelineError::IndexUnavailable(format!(
                "index was built with embedding {}/{} dims but provider is {}/{} dims; re-ingest",
                m, d, model_name, dims
            ))),
            // Never ingested: allow open, retrieval will simply be empty.
            _ => Ok(()),
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn connect(config: &Config, create: bool) -> Result<SqlitePool, PipelineError> {
    let db_path = &config.index.path;

    if create {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Internal(anyhow::anyhow!(e)))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(PipelineError::Storage)?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS policy_chunks (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(source_id, sequence_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES policy_chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_policy_chunks_source ON policy_chunks(source_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::io::Write;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[index]
path = "{}/index.sqlite"

[policies]
dir = "{}"
"#,
            dir.display(),
            dir.display()
        )
        .unwrap();
        load_config(f.path()).unwrap()
    }

    fn make_chunk(source_id: &str, seq: i64, text: &str) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            sequence_index: seq,
            text: text.to_string(),
            hash: format!("{:x}", sha2::Sha256::digest(text.as_bytes())),
        }
    }

    use sha2::Digest;

    #[tokio::test]
    async fn test_open_missing_database_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        let err = PolicyIndex::open(&cfg).await.unwrap_err();
        assert!(matches!(err, PipelineError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_init_then_open() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        PolicyIndex::init(&cfg).await.unwrap(); // idempotent
        let index = PolicyIndex::open(&cfg).await.unwrap();
        assert!(index.is_empty().await.unwrap());
        index.close().await;
    }

    #[tokio::test]
    async fn test_rebuild_and_entries_preserve_order() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();

        let entries = vec![
            (make_chunk("a_policy", 0, "alpha"), vec![1.0, 0.0]),
            (make_chunk("a_policy", 1, "beta"), vec![0.0, 1.0]),
            (make_chunk("b_policy", 0, "gamma"), vec![0.5, 0.5]),
        ];
        index.rebuild(&entries, "hash-v1", 2).await.unwrap();

        let stored = index.entries().await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].text, "alpha");
        assert_eq!(stored[1].text, "beta");
        assert_eq!(stored[2].text, "gamma");
        assert!(stored[0].rowid < stored[1].rowid);
        assert_eq!(stored[0].embedding, vec![1.0, 0.0]);
        index.close().await;
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();

        let first = vec![(make_chunk("old", 0, "old text"), vec![1.0])];
        index.rebuild(&first, "hash-v1", 1).await.unwrap();

        let second = vec![
            (make_chunk("new", 0, "new text"), vec![0.5]),
            (make_chunk("new", 1, "more text"), vec![0.25]),
        ];
        index.rebuild(&second, "hash-v1", 1).await.unwrap();

        let stored = index.entries().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|e| e.source_id == "new"));
        index.close().await;
    }

    #[tokio::test]
    async fn test_provider_mismatch_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();

        let entries = vec![(make_chunk("p", 0, "text"), vec![1.0, 0.0])];
        index.rebuild(&entries, "hash-v1", 2).await.unwrap();

        assert!(index.verify_provider("hash-v1", 2).await.is_ok());
        let err = index
            .verify_provider("text-embedding-3-small", 1536)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IndexUnavailable(_)));
        index.close().await;
    }
}
