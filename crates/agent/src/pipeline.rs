//! Wiring: build every agent from an [`AppConfig`].

use std::sync::Arc;

use ragweave_config::AppConfig;
use ragweave_core::connector::{ConnectorRegistry, ToolConnector};
use ragweave_core::error::{Error, KnowledgeError};
use ragweave_core::provider::Provider;
use ragweave_core::vector::VectorStore;
use ragweave_telemetry::{TelemetryEngine, TelemetrySink};
use serde::Serialize;
use tracing::{info, warn};

use crate::embedding_retriever::EmbeddingRetriever;
use crate::knowledge::KnowledgeAgent;
use crate::retrieval::RetrievalAgent;
use crate::supervisor::SupervisorOrchestrator;
use crate::tool_execution::ToolExecutionAgent;

/// A fully assembled orchestrator plus the handles the front ends need.
pub struct Pipeline {
    pub config: AppConfig,
    pub supervisor: Arc<SupervisorOrchestrator>,
    pub connectors: Arc<ConnectorRegistry>,
    pub store: Arc<dyn VectorStore>,
    pub chat: Arc<dyn Provider>,
    pub embedder: Arc<dyn Provider>,
    /// Present when telemetry is enabled
    pub telemetry: Option<Arc<TelemetryEngine>>,
}

/// Reachability of the configured model endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointHealth {
    pub model: bool,
    pub embedding: bool,
}

impl Pipeline {
    /// Validate the configuration, connect the configured endpoints and
    /// initialise every tool connector.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        config.validate().map_err(|e| Error::Config { message: e.to_string() })?;
        let (chat, embedder) = ragweave_providers::from_config(&config);
        let store = ragweave_vectorstore::from_config(&config).await?;
        let connectors = ragweave_tools::connectors_from_config(&config);
        Self::assemble(config, chat, embedder, store, connectors).await
    }

    /// Build from explicit collaborators.
    pub async fn assemble(
        config: AppConfig,
        chat: Arc<dyn Provider>,
        embedder: Arc<dyn Provider>,
        store: Arc<dyn VectorStore>,
        connectors: Vec<Box<dyn ToolConnector>>,
    ) -> Result<Self, Error> {
        tokio::fs::create_dir_all(&config.knowledge.dir)
            .await
            .map_err(|e| KnowledgeError::Io {
                path: config.knowledge.dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let retriever = Arc::new(EmbeddingRetriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            &config.embedding.model,
            config.embedding.dimension,
        ));
        let knowledge = Arc::new(
            KnowledgeAgent::from_config(&config.knowledge, Arc::clone(&retriever))
                .with_collection_index(&config.vector_store.index_name),
        );
        let retrieval = Arc::new(RetrievalAgent::from_config(&config.retrieval, retriever));

        let registry = Arc::new(ConnectorRegistry::connect(connectors).await);
        let executor = Arc::new(ToolExecutionAgent::from_config(
            Arc::clone(&chat),
            Arc::clone(&registry),
            &config,
        ));

        let telemetry = config.telemetry.enabled.then(|| Arc::new(TelemetryEngine::new()));
        let mut supervisor = SupervisorOrchestrator::new(knowledge, retrieval, executor)
            .with_retrieval_degradation(config.agent.degrade_on_retrieval_failure)
            .with_max_query_chars(config.agent.max_query_chars);
        if let Some(engine) = &telemetry {
            supervisor = supervisor.with_telemetry(Arc::clone(engine) as Arc<dyn TelemetrySink>);
        }

        info!(
            model = %config.model.name,
            store = %store.name(),
            connectors = ?registry.connector_names(),
            tools = registry.tool_count(),
            "Pipeline ready"
        );

        Ok(Self {
            config,
            supervisor: Arc::new(supervisor),
            connectors: registry,
            store,
            chat,
            embedder,
            telemetry,
        })
    }

    /// Ask both endpoints whether they are reachable. A failed check
    /// counts as unreachable.
    pub async fn endpoint_health(&self) -> EndpointHealth {
        let (model, embedding) =
            tokio::join!(reachable(self.chat.as_ref()), reachable(self.embedder.as_ref()));
        EndpointHealth { model, embedding }
    }

    /// Close connectors and the vector store.
    pub async fn shutdown(&self) {
        self.connectors.close().await;
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Vector store close failed");
        }
    }
}

async fn reachable(provider: &dyn Provider) -> bool {
    match provider.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(provider = %provider.name(), error = %e, "Health check failed");
            false
        }
    }
}
