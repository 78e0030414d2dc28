//! # ragweave core
//!
//! Domain types, traits, and error definitions for the ragweave
//! retrieval-augmented, tool-calling orchestrator. Every external
//! collaborator (model endpoint, vector store, tool connector) is a trait
//! here; implementations live in their own crates and all crates depend
//! inward on this one.

pub mod connector;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod vector;

// Re-export key types at crate root for ergonomics
pub use connector::{ConnectorRegistry, ToolConnector};
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use vector::{Document, VectorStore};
