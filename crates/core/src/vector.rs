//! VectorStore trait: persistence and similarity search over
//! `(embedding, text)` documents.
//!
//! Every backend holds a single collection whose dimension is fixed at
//! construction; inserts with any other dimension are rejected, so callers
//! resize embeddings before storing them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::VectorStoreError;

/// A stored document. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The embedding vector (collection dimension)
    pub embedding: Vec<f32>,

    /// The text the embedding was computed from
    pub text: String,
}

/// The core VectorStore trait.
///
/// Implementations: in-memory, SQLite, OpenSearch k-NN.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite", "opensearch").
    fn name(&self) -> &str;

    /// The fixed embedding dimension of the collection.
    fn dimension(&self) -> usize;

    /// Store one document.
    async fn add_embedding(
        &self,
        embedding: Vec<f32>,
        text: String,
    ) -> std::result::Result<(), VectorStoreError>;

    /// Return the texts of the `top_k` most similar documents, most similar
    /// first. Ties keep the backend's own stable order.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<String>, VectorStoreError>;

    /// Number of stored documents.
    async fn count(&self) -> std::result::Result<usize, VectorStoreError>;

    /// Drop every document (collection rebuild).
    async fn reset(&self) -> std::result::Result<(), VectorStoreError>;

    /// Release backend resources.
    async fn close(&self) -> std::result::Result<(), VectorStoreError> {
        Ok(())
    }
}

/// Reject embeddings whose length differs from the collection dimension.
pub fn check_dimension(
    expected: usize,
    embedding: &[f32],
) -> std::result::Result<(), VectorStoreError> {
    if embedding.len() != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_check() {
        assert!(check_dimension(3, &[0.0, 1.0, 0.0]).is_ok());
        let err = check_dimension(384, &[1.0; 768]).unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 384, actual: 768 }));
    }
}
