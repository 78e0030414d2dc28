//! The orchestration layer of ragweave.
//!
//! A user task flows through three stages run by the
//! [`SupervisorOrchestrator`]:
//!
//! 1. **Knowledge check** ([`KnowledgeAgent`]): fingerprint the knowledge
//!    directory and embed whatever changed since the last run
//! 2. **Retrieval** ([`RetrievalAgent`]): embed the query and pull the most
//!    similar documents into a context block
//! 3. **Tool execution** ([`ToolExecutionAgent`]): drive the model through
//!    rounds of tool calls until it answers without requesting any
//!
//! Every stage leaves a ledger entry; the final [`TaskReport`] says whether
//! the task completed or which stage aborted it.

pub mod chat_session;
pub mod embedding_retriever;
pub mod knowledge;
pub mod pipeline;
pub mod retrieval;
pub mod supervisor;
pub mod tabular;
pub mod tool_execution;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chat_session::{ChatSession, Turn};
pub use embedding_retriever::{Embedding, EmbeddingRetriever, Retrieved, fallback_vector, resize};
pub use knowledge::{
    CollectionIdentity, Delta, EmbedReport, FileFingerprint, FingerprintMap, KnowledgeAgent,
    KnowledgeStats,
};
pub use pipeline::{EndpointHealth, Pipeline};
pub use retrieval::{NO_CONTEXT, RetrievalAgent, RetrievedContext};
pub use supervisor::{
    LedgerSummary, SupervisorOrchestrator, TaskLedger, TaskReport, TaskResult, TaskStatus,
};
pub use tool_execution::{LoopState, ToolExecutionAgent, ToolRunResult};

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
