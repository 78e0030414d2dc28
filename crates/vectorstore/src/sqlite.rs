//! SQLite vector backend.
//!
//! One table holds every collection's documents; embeddings are stored as
//! little-endian f32 blobs. Search loads the collection and ranks it with
//! cosine similarity in process, which is adequate for knowledge bases of
//! a few thousand documents.

use crate::vector::{blob_to_embedding, embedding_to_blob, rank_documents};
use async_trait::async_trait;
use chrono::Utc;
use ragweave_core::error::VectorStoreError;
use ragweave_core::vector::{Document, VectorStore, check_dimension};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A SQLite-backed vector store bound to one collection.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
    dimension: usize,
}

impl SqliteVectorStore {
    /// Open (or create) the database at `path` and bind to `collection`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(
        path: &str,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, VectorStoreError> {
        if let Some(parent) = std::path::Path::new(path.trim_start_matches("sqlite:")).parent()
            && !parent.as_os_str().is_empty()
            && !path.contains(":memory:")
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                VectorStoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| VectorStoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Each connection to `:memory:` is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| VectorStoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            collection: collection.to_string(),
            dimension,
        };
        store.run_migrations().await?;
        info!(collection, dimension, "SQLite vector store initialized at {path}");
        Ok(store)
    }

    /// Create tables and indexes.
    async fn run_migrations(&self) -> Result<(), VectorStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                collection   TEXT NOT NULL,
                text         TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                dimension    INTEGER NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VectorStoreError::MigrationFailed(format!("documents table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VectorStoreError::MigrationFailed(format!("collection index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn load_collection(&self) -> Result<Vec<Document>, VectorStoreError> {
        let rows = sqlx::query(
            "SELECT text, embedding, dimension FROM documents WHERE collection = ? ORDER BY id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::QueryFailed(format!("load collection: {e}")))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row
                .try_get("text")
                .map_err(|e| VectorStoreError::QueryFailed(format!("text column: {e}")))?;
            let blob: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| VectorStoreError::QueryFailed(format!("embedding column: {e}")))?;
            let embedding = blob_to_embedding(&blob);
            if embedding.len() != self.dimension {
                warn!(
                    collection = %self.collection,
                    stored = embedding.len(),
                    expected = self.dimension,
                    "Skipping document with foreign dimension"
                );
                continue;
            }
            documents.push(Document { embedding, text });
        }
        Ok(documents)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn add_embedding(
        &self,
        embedding: Vec<f32>,
        text: String,
    ) -> Result<(), VectorStoreError> {
        check_dimension(self.dimension, &embedding)?;
        sqlx::query(
            "INSERT INTO documents (collection, text, embedding, dimension, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.collection)
        .bind(&text)
        .bind(embedding_to_blob(&embedding))
        .bind(self.dimension as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Storage(format!("insert document: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<String>, VectorStoreError> {
        check_dimension(self.dimension, embedding)
            .map_err(|e| VectorStoreError::QueryFailed(e.to_string()))?;
        let documents = self.load_collection().await?;
        debug!(
            collection = %self.collection,
            candidates = documents.len(),
            top_k,
            "SQLite vector search"
        );
        Ok(rank_documents(&documents, embedding, top_k))
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::QueryFailed(format!("count: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| VectorStoreError::QueryFailed(format!("count column: {e}")))?;
        Ok(n.max(0) as usize)
    }

    async fn reset(&self) -> Result<(), VectorStoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Storage(format!("reset collection: {e}")))?;
        info!(collection = %self.collection, "Collection reset");
        Ok(())
    }

    async fn close(&self) -> Result<(), VectorStoreError> {
        self.pool.close().await;
        Ok(())
    }
}
