//! The local connector: built-in tools exposed through the connector
//! interface so they are routed like any remote tool.

use std::path::PathBuf;

use async_trait::async_trait;
use ragweave_core::connector::ToolConnector;
use ragweave_core::error::ToolError;
use ragweave_core::provider::ToolDefinition;
use ragweave_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::debug;

use crate::file_read::FileReadTool;
use crate::file_write::FileWriteTool;
use crate::list_directory::ListDirectoryTool;
use crate::workspace::Workspace;

pub struct LocalConnector {
    name: String,
    output_dir: PathBuf,
    registry: ToolRegistry,
}

impl LocalConnector {
    /// Wrap an arbitrary registry.
    pub fn new(
        name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
            registry,
        }
    }

    /// The built-in file tools. Writes are confined to `output_dir`; reads
    /// may also reach the extra `readable` directories (e.g. the knowledge
    /// directory).
    pub fn with_file_tools(output_dir: impl Into<PathBuf>, readable: Vec<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let output = Workspace::new(&output_dir);
        let mut roots = vec![output.clone()];
        roots.extend(readable.into_iter().map(Workspace::new));

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FileReadTool::new(roots.clone())));
        registry.register(Box::new(FileWriteTool::new(output)));
        registry.register(Box::new(ListDirectoryTool::new(roots)));
        Self::new("local", output_dir, registry)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ToolConnector for LocalConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ToolError::ConnectorUnavailable {
                connector: self.name.clone(),
                reason: format!(
                    "cannot create output directory {}: {e}",
                    self.output_dir.display()
                ),
            })?;
        debug!(connector = %self.name, tools = ?self.registry.names(), "Local tools ready");
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        self.registry
            .execute(&ToolCall {
                id: String::new(),
                name: name.to_string(),
                arguments,
            })
            .await
    }
}
