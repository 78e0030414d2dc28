//! OpenSearch k-NN backend.
//!
//! Documents live in a single index with a `knn_vector` field (HNSW,
//! cosine similarity). The index is created on first use with the
//! collection dimension; the engine's own ranking order is returned as is.

use async_trait::async_trait;
use chrono::Utc;
use ragweave_core::error::VectorStoreError;
use ragweave_core::vector::{VectorStore, check_dimension};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings for [`OpenSearchVectorStore`].
#[derive(Debug, Clone)]
pub struct OpenSearchSettings {
    pub endpoint: String,
    pub index: String,
    pub dimension: usize,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A vector store backed by an OpenSearch k-NN index.
pub struct OpenSearchVectorStore {
    settings: OpenSearchSettings,
    client: reqwest::Client,
}

impl OpenSearchVectorStore {
    /// Connect and make sure the index exists.
    pub async fn connect(mut settings: OpenSearchSettings) -> Result<Self, VectorStoreError> {
        settings.endpoint = settings.endpoint.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VectorStoreError::Storage(format!("HTTP client: {e}")))?;
        let store = Self { settings, client };
        store.ensure_index().await?;
        Ok(store)
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.settings.endpoint, self.settings.index, suffix)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.settings.username {
            Some(user) => builder.basic_auth(user, self.settings.password.as_deref()),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value, VectorStoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| VectorStoreError::Storage(format!("{what}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::QueryFailed(format!("{what}: HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| VectorStoreError::QueryFailed(format!("{what}: unreadable body: {e}")))
    }

    /// Create the index with the k-NN mapping if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<(), VectorStoreError> {
        let response = self
            .request(reqwest::Method::HEAD, self.index_url(""))
            .send()
            .await
            .map_err(|e| VectorStoreError::Storage(format!("index lookup: {e}")))?;
        if response.status().is_success() {
            debug!(index = %self.settings.index, "Index already exists");
            return Ok(());
        }

        let body = index_mapping(self.settings.dimension);
        self.send(
            self.request(reqwest::Method::PUT, self.index_url("")).json(&body),
            "create index",
        )
        .await?;
        info!(
            index = %self.settings.index,
            dimension = self.settings.dimension,
            "Created k-NN index"
        );
        Ok(())
    }
}

/// Index body: k-NN enabled, HNSW with cosine similarity.
pub fn index_mapping(dimension: usize) -> serde_json::Value {
    serde_json::json!({
        "settings": { "index": { "knn": true } },
        "mappings": {
            "properties": {
                "embedding": {
                    "type": "knn_vector",
                    "dimension": dimension,
                    "method": { "name": "hnsw", "space_type": "cosinesimil", "engine": "nmslib" }
                },
                "document": { "type": "text" },
                "metadata": { "type": "object" },
                "timestamp": { "type": "date" }
            }
        }
    })
}

/// k-NN query body returning only the document text.
pub fn knn_query(embedding: &[f32], top_k: usize) -> serde_json::Value {
    serde_json::json!({
        "size": top_k,
        "query": { "knn": { "embedding": { "vector": embedding, "k": top_k } } },
        "_source": ["document"]
    })
}

/// Pull `hits.hits[]._source.document` out of a search response, in order.
pub fn parse_hits(body: &serde_json::Value) -> Result<Vec<String>, VectorStoreError> {
    let hits = body["hits"]["hits"]
        .as_array()
        .ok_or_else(|| VectorStoreError::QueryFailed("search response has no hits array".into()))?;
    Ok(hits
        .iter()
        .filter_map(|hit| {
            let text = hit["_source"]["document"].as_str();
            if text.is_none() {
                warn!(id = %hit["_id"], "Hit without a document field");
            }
            text.map(String::from)
        })
        .collect())
}

#[async_trait]
impl VectorStore for OpenSearchVectorStore {
    fn name(&self) -> &str {
        "opensearch"
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    async fn add_embedding(
        &self,
        embedding: Vec<f32>,
        text: String,
    ) -> Result<(), VectorStoreError> {
        check_dimension(self.settings.dimension, &embedding)?;
        let body = serde_json::json!({
            "embedding": embedding,
            "document": text,
            "metadata": {},
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.send(
            self.request(reqwest::Method::POST, self.index_url("/_doc?refresh=true")).json(&body),
            "index document",
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<String>, VectorStoreError> {
        check_dimension(self.settings.dimension, embedding)
            .map_err(|e| VectorStoreError::QueryFailed(e.to_string()))?;
        let body = self
            .send(
                self.request(reqwest::Method::POST, self.index_url("/_search"))
                    .json(&knn_query(embedding, top_k)),
                "k-NN search",
            )
            .await?;
        parse_hits(&body)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let body = self
            .send(self.request(reqwest::Method::GET, self.index_url("/_count")), "count")
            .await?;
        body["count"]
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| VectorStoreError::QueryFailed("count response has no count".into()))
    }

    async fn reset(&self) -> Result<(), VectorStoreError> {
        self.send(self.request(reqwest::Method::DELETE, self.index_url("")), "delete index")
            .await?;
        info!(index = %self.settings.index, "Index deleted, recreating");
        self.ensure_index().await
    }
}
