//! Query → formatted context block.

use std::sync::Arc;

use ragweave_config::RetrievalConfig;
use ragweave_core::error::VectorStoreError;
use ragweave_telemetry::{Span, SpanKind, TraceHandle};
use tracing::{debug, info, warn};

use crate::embedding_retriever::EmbeddingRetriever;
use crate::truncate_chars;

/// Returned in place of a context block when nothing was retrieved.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Retrieval output handed to the tool-calling stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    /// Formatted context block, or [`NO_CONTEXT`]
    pub text: String,
    /// Documents after re-ranking and truncation, best first
    pub documents: Vec<String>,
    /// The query vector was a fallback, so relevance is meaningless
    pub degraded: bool,
}

impl RetrievedContext {
    /// Context used when retrieval is skipped or failed.
    pub fn empty() -> Self {
        Self {
            text: NO_CONTEXT.to_string(),
            documents: Vec::new(),
            degraded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct RetrievalAgent {
    retriever: Arc<EmbeddingRetriever>,
    top_k: usize,
    rerank: bool,
    candidate_multiplier: usize,
    max_document_chars: usize,
}

impl RetrievalAgent {
    pub fn new(retriever: Arc<EmbeddingRetriever>) -> Self {
        Self::from_config(&RetrievalConfig::default(), retriever)
    }

    pub fn from_config(config: &RetrievalConfig, retriever: Arc<EmbeddingRetriever>) -> Self {
        Self {
            retriever,
            top_k: config.top_k,
            rerank: config.rerank,
            candidate_multiplier: config.candidate_multiplier.max(1),
            max_document_chars: config.max_document_chars,
        }
    }

    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.rerank = enabled;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The formatted context for `query` using the `top_k` best documents.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<String, VectorStoreError> {
        Ok(self.retrieve(query, top_k, &TraceHandle::disabled()).await?.text)
    }

    /// Full retrieval: vector search, optional re-ranking, truncation and
    /// formatting. Vector store failures propagate.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        trace: &TraceHandle,
    ) -> Result<RetrievedContext, VectorStoreError> {
        let candidates = if self.rerank {
            top_k.saturating_mul(self.candidate_multiplier)
        } else {
            top_k
        };

        let span = Span::new(SpanKind::Embedding, self.retriever.model());
        let embedding = self.retriever.embed_detailed(query).await;
        trace.record(span.with_meta("degraded", embedding.degraded).finished(!embedding.degraded));
        if embedding.degraded {
            warn!("Query embedding is a fallback vector; retrieved context is not meaningful");
        }

        let span = Span::new(SpanKind::Retrieval, self.retriever.store().name());
        let found = match self.retriever.store().search(&embedding.vector, candidates).await {
            Ok(found) => {
                trace.record(span.with_meta("documents", found.len()).finished(true));
                found
            }
            Err(e) => {
                trace.record(span.with_meta("error", e.to_string()).finished(false));
                return Err(e);
            }
        };

        let documents = if self.rerank {
            Self::rerank(query, &found, top_k)
        } else {
            found
        };
        let documents: Vec<String> = documents
            .iter()
            .map(|d| truncate_chars(d, self.max_document_chars))
            .collect();

        info!(documents = documents.len(), rerank = self.rerank, "Context retrieved");
        Ok(RetrievedContext {
            text: format_context(&documents),
            documents,
            degraded: embedding.degraded,
        })
    }

    /// Re-score `documents` by how often the query's terms occur in them and
    /// keep the `top_k` best. Ties keep their incoming order. Pure.
    pub fn rerank(query: &str, documents: &[String], top_k: usize) -> Vec<String> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        let mut scored: Vec<(usize, &String)> = documents
            .iter()
            .map(|doc| {
                let lower = doc.to_lowercase();
                let score = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
                (score, doc)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!(candidates = documents.len(), top_k, "Re-ranked documents");
        scored.into_iter().take(top_k).map(|(_, doc)| doc.clone()).collect()
    }
}

/// `[Context n]` blocks, or [`NO_CONTEXT`] when there are none.
pub fn format_context(documents: &[String]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT.to_string();
    }
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[Context {}]\n{doc}\n", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, StaticEmbeddingProvider};
    use ragweave_core::vector::VectorStore;
    use ragweave_vectorstore::InMemoryVectorStore;

    async fn agent_with(docs: &[&str]) -> RetrievalAgent {
        let provider = Arc::new(StaticEmbeddingProvider::new(32));
        let store = Arc::new(InMemoryVectorStore::new(32));
        for doc in docs {
            store.add_embedding(provider.vector_for(doc), doc.to_string()).await.unwrap();
        }
        RetrievalAgent::new(Arc::new(EmbeddingRetriever::new(provider, store, "embed", 32)))
    }

    #[tokio::test]
    async fn empty_collection_gives_no_context() {
        let agent = agent_with(&[]).await;
        assert_eq!(agent.retrieve_context("anything", 5).await.unwrap(), NO_CONTEXT);
    }

    #[tokio::test]
    async fn context_blocks_are_numbered() {
        let agent = agent_with(&["apple pie", "kiwi"]).await;
        let text = agent.retrieve_context("apple", 1).await.unwrap();
        assert_eq!(text, "[Context 1]\napple pie\n");
    }

    #[tokio::test]
    async fn long_documents_are_truncated() {
        let long = "é".repeat(800);
        let agent = agent_with(&[long.as_str()]).await;
        let ctx = agent.retrieve("é", 1, &TraceHandle::disabled()).await.unwrap();
        assert_eq!(ctx.documents[0].chars().count(), 500);
    }

    #[tokio::test]
    async fn fallback_query_vector_is_flagged() {
        let store = Arc::new(InMemoryVectorStore::new(8));
        store.add_embedding(vec![1.0; 8], "doc".into()).await.unwrap();
        let retriever = EmbeddingRetriever::new(Arc::new(FailingProvider), store, "embed", 8);
        let agent = RetrievalAgent::new(Arc::new(retriever));
        let ctx = agent.retrieve("q", 3, &TraceHandle::disabled()).await.unwrap();
        assert!(ctx.degraded);
        assert_eq!(ctx.documents, vec!["doc"]);
    }

    #[tokio::test]
    async fn rerank_reorders_candidates() {
        let agent = agent_with(&["rust rust rust", "rust", "python"]).await.with_rerank(true);
        let ctx = agent.retrieve("rust", 2, &TraceHandle::disabled()).await.unwrap();
        assert_eq!(ctx.documents, vec!["rust rust rust", "rust"]);
    }

    #[test]
    fn rerank_scores_term_frequency_and_is_pure() {
        let docs: Vec<String> = ["no match here", "cats and dogs", "dogs dogs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let first = RetrievalAgent::rerank("Dogs?", &docs, 2);
        let second = RetrievalAgent::rerank("Dogs?", &docs, 2);
        assert_eq!(first, vec!["dogs dogs", "cats and dogs"]);
        assert_eq!(first, second);
    }

    #[test]
    fn rerank_ties_keep_input_order() {
        let docs: Vec<String> = ["b", "a", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(RetrievalAgent::rerank("zzz", &docs, 3), docs);
    }
}
