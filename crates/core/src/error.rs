//! Error types for the ragweave domain.
//!
//! Each bounded context (model provider, vector store, tools, knowledge
//! ingestion) has its own error enum; [`Error`] wraps them all and adds
//! the orchestration-level failures.

use thiserror::Error;

/// The top-level error type for all ragweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Vector store errors ---
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Knowledge ingestion errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Orchestration ---
    /// A knowledge or retrieval stage failed and aborted the pipeline.
    #[error("Pipeline stage '{stage}' failed: {source}")]
    PipelineStage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Tool loop exceeded the maximum of {limit} model rounds")]
    MaxRoundsExceeded { limit: usize },

    #[error("Tool loop exceeded the maximum of {limit} tool calls")]
    MaxToolCallsExceeded { limit: usize },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an error as the failure of a named pipeline stage.
    pub fn stage(stage: impl Into<String>, source: Error) -> Self {
        Error::PipelineStage {
            stage: stage.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The endpoint answered with a non-2xx status.
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// The endpoint answered 2xx but the body lacked the expected fields.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding has dimension {actual}, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Connector '{connector}' unavailable: {reason}")]
    ConnectorUnavailable { connector: String, reason: String },
}

impl ToolError {
    /// Short machine-readable kind, used in error-shaped tool results.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "tool_not_found",
            ToolError::ExecutionFailed { .. } => "tool_execution_failed",
            ToolError::PermissionDenied { .. } => "permission_denied",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::ConnectorUnavailable { .. } => "connector_unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge directory does not exist: {0}")]
    MissingRoot(String),

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Fingerprint metadata error: {0}")]
    Metadata(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn stage_error_keeps_source() {
        let inner = Error::VectorStore(VectorStoreError::QueryFailed("index offline".into()));
        let err = Error::stage("retrieval", inner);
        assert!(err.to_string().contains("retrieval"));
        assert!(err.to_string().contains("index offline"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn tool_error_kinds() {
        assert_eq!(ToolError::NotFound("x".into()).kind(), "tool_not_found");
        let err = ToolError::ExecutionFailed {
            tool_name: "file_write".into(),
            reason: "disk full".into(),
        };
        assert_eq!(err.kind(), "tool_execution_failed");
        assert!(err.to_string().contains("disk full"));
    }
}
