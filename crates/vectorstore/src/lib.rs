//! Vector store backends for ragweave.
//!
//! All backends implement `ragweave_core::VectorStore` and are
//! interchangeable; [`from_config`] picks one from configuration.

pub mod in_memory;
pub mod opensearch;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use ragweave_config::{AppConfig, VectorBackend};
use ragweave_core::VectorStore;
use ragweave_core::error::VectorStoreError;

pub use in_memory::InMemoryVectorStore;
pub use opensearch::{OpenSearchSettings, OpenSearchVectorStore};
pub use vector::{cosine_similarity, rank_documents};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;

/// Build the configured backend.
pub async fn from_config(config: &AppConfig) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let dimension = config.embedding.dimension;
    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        VectorBackend::Memory => Arc::new(InMemoryVectorStore::new(dimension)),
        #[cfg(feature = "sqlite")]
        VectorBackend::Sqlite => {
            let path = format!("sqlite://{}", config.sqlite_path().display());
            let index = &config.vector_store.index_name;
            Arc::new(SqliteVectorStore::new(&path, index, dimension).await?)
        }
        #[cfg(not(feature = "sqlite"))]
        VectorBackend::Sqlite => {
            return Err(VectorStoreError::Storage(
                "SQLite backend not compiled in (enable the 'sqlite' feature)".into(),
            ));
        }
        VectorBackend::Opensearch => {
            let endpoint = config.vector_store.opensearch_endpoint.clone().ok_or_else(|| {
                VectorStoreError::Storage("opensearch backend needs an endpoint".into())
            })?;
            Arc::new(
                OpenSearchVectorStore::connect(OpenSearchSettings {
                    endpoint,
                    index: config.vector_store.index_name.clone(),
                    dimension,
                    username: config.vector_store.opensearch_username.clone(),
                    password: config.vector_store.opensearch_password.clone(),
                })
                .await?,
            )
        }
    };
    tracing::info!(backend = store.name(), dimension, "Vector store ready");
    Ok(store)
}
