//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use ragweave_core::error::VectorStoreError;
use ragweave_core::vector::{Document, VectorStore, check_dimension};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector::rank_documents;

/// A vector store that keeps documents in a Vec, in insertion order.
pub struct InMemoryVectorStore {
    dimension: usize,
    documents: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of the stored documents.
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
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
        self.documents.write().await.push(Document { embedding, text });
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<String>, VectorStoreError> {
        check_dimension(self.dimension, embedding)
            .map_err(|e| VectorStoreError::QueryFailed(e.to_string()))?;
        let documents = self.documents.read().await;
        Ok(rank_documents(&documents, embedding, top_k))
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.documents.read().await.len())
    }

    async fn reset(&self) -> Result<(), VectorStoreError> {
        self.documents.write().await.clear();
        Ok(())
    }
}
