//! Text → fixed-dimension vector, plus the similarity lookup built on it.
//!
//! Embedding never fails from the caller's point of view: when the
//! endpoint errors or returns something unusable, a random unit vector of
//! the collection dimension is substituted and the result is flagged
//! `degraded`.

use std::sync::Arc;

use rand::Rng;
use ragweave_core::error::{ProviderError, VectorStoreError};
use ragweave_core::provider::{EmbeddingRequest, Provider};
use ragweave_core::vector::VectorStore;
use tracing::{debug, warn};

/// An embedding plus whether it came from the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// True when the vector is a random stand-in, not a real embedding.
    pub degraded: bool,
}

/// Documents returned for a query, with the quality flag of the query vector.
#[derive(Debug, Clone, Default)]
pub struct Retrieved {
    pub documents: Vec<String>,
    pub degraded: bool,
}

pub struct EmbeddingRetriever {
    provider: Arc<dyn Provider>,
    store: Arc<dyn VectorStore>,
    model: String,
    dimension: usize,
}

impl EmbeddingRetriever {
    /// `dimension` is the collection's fixed size; every vector produced is
    /// resized to it.
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn VectorStore>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            provider,
            store,
            model: model.into(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed `text`. Always returns a vector of length `dimension`.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_detailed(text).await.vector
    }

    /// Like [`embed`](Self::embed) but reports whether the fallback was used.
    pub async fn embed_detailed(&self, text: &str) -> Embedding {
        match self.request_embedding(text).await {
            Ok(raw) => {
                let vector = if raw.len() == self.dimension {
                    raw
                } else {
                    debug!(from = raw.len(), to = self.dimension, "Resizing embedding");
                    resize(&raw, self.dimension)
                };
                Embedding { vector, degraded: false }
            }
            Err(e) => {
                warn!(
                    provider = %self.provider.name(),
                    error = %e,
                    "Embedding failed, substituting fallback vector"
                );
                Embedding {
                    vector: fallback_vector(self.dimension),
                    degraded: true,
                }
            }
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await?;
        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no embedding in response".into()))?;
        if vector.is_empty() || vector.iter().any(|x| !x.is_finite()) {
            return Err(ProviderError::MalformedResponse(
                "embedding is empty or contains non-finite values".into(),
            ));
        }
        Ok(vector)
    }

    /// Embed the query and return the `top_k` most similar documents, in the
    /// store's order.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, VectorStoreError> {
        Ok(self.retrieve_detailed(query, top_k).await?.documents)
    }

    pub async fn retrieve_detailed(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Retrieved, VectorStoreError> {
        let embedding = self.embed_detailed(query).await;
        let documents = self.store.search(&embedding.vector, top_k).await?;
        Ok(Retrieved {
            documents,
            degraded: embedding.degraded,
        })
    }
}

/// Resize `embedding` to exactly `dim` entries with unit L2 norm.
///
/// Target slot `i` averages source indices `[i*len/dim, (i+1)*len/dim)`;
/// an empty range (upsampling) takes the element at its start. Inputs that
/// are empty or normalise to zero map to the uniform vector.
pub fn resize(embedding: &[f32], dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }
    let len = embedding.len();
    if len == 0 {
        return uniform_unit(dim);
    }

    let resized: Vec<f32> = (0..dim)
        .map(|i| {
            let start = (i * len / dim).min(len - 1);
            let end = ((i + 1) * len / dim).clamp(start + 1, len);
            let bucket = &embedding[start..end];
            bucket.iter().sum::<f32>() / bucket.len() as f32
        })
        .collect();
    l2_normalize(resized)
}

/// A random unit vector of length `dim`.
pub fn fallback_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    let raw: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..=1.0)).collect();
    l2_normalize(raw)
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return uniform_unit(v.len());
    }
    for x in &mut v {
        *x /= norm;
    }
    v
}

fn uniform_unit(dim: usize) -> Vec<f32> {
    vec![1.0 / (dim as f32).sqrt(); dim]
}
