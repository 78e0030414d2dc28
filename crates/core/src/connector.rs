//! Tool connectors and name-based routing.
//!
//! A [`ToolConnector`] exposes a set of named tools and a way to invoke
//! them (the built-in local tools, or a remote tool server). Tools are
//! discovered once when the [`ConnectorRegistry`] is built; at call time
//! the registry resolves a tool name to the connector that owns it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::tool::ToolResult;

/// Separator between a connector namespace and a tool name
/// (`tavily___web_search`).
pub const NAMESPACE_SEPARATOR: &str = "___";

/// A source of callable tools.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Connector name, used in logs and error payloads.
    fn name(&self) -> &str;

    /// Connect and discover tools. Called exactly once before `tools()`.
    ///
    /// A connector that cannot enumerate its tools should still expose a
    /// documented fallback tool rather than returning an error.
    async fn init(&mut self) -> std::result::Result<(), ToolError>;

    /// Tools discovered during `init`.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Invoke one of this connector's tools. `name` is the name as listed
    /// by `tools()`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Release transport resources.
    async fn close(&self) -> std::result::Result<(), ToolError> {
        Ok(())
    }
}

/// Split `ns___tool` into `(Some("ns"), "tool")`.
pub fn split_namespace(name: &str) -> (Option<&str>, &str) {
    match name.split_once(NAMESPACE_SEPARATOR) {
        Some((ns, tool)) if !ns.is_empty() && !tool.is_empty() => (Some(ns), tool),
        _ => (None, name),
    }
}

/// One discovered tool and the connector that owns it.
struct IndexedTool {
    definition: ToolDefinition,
    connector: usize,
}

/// Registry of initialised connectors, indexed by tool name.
///
/// Resolution order for a requested name:
/// 1. exact match;
/// 2. a listed tool named `<namespace>___<requested>`;
/// 3. if the request itself is namespaced, its bare tool name (exact,
///    then suffix).
///
/// When two connectors expose the same name the first one discovered wins.
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn ToolConnector>>,
    tools: Vec<IndexedTool>,
    by_name: HashMap<String, usize>,
}

impl ConnectorRegistry {
    /// Initialise every connector and index its tools.
    ///
    /// A connector whose `init` fails is logged and left out; the rest of
    /// the registry is still usable.
    pub async fn connect(connectors: Vec<Box<dyn ToolConnector>>) -> Self {
        let mut ready: Vec<Arc<dyn ToolConnector>> = Vec::new();
        for mut connector in connectors {
            match connector.init().await {
                Ok(()) => ready.push(Arc::from(connector)),
                Err(e) => warn!(
                    connector = %connector.name(),
                    error = %e,
                    "Connector failed to initialise, skipping"
                ),
            }
        }
        Self::from_initialised(ready)
    }

    /// Index connectors that have already been initialised.
    pub fn from_initialised(connectors: Vec<Arc<dyn ToolConnector>>) -> Self {
        let mut tools = Vec::new();
        let mut by_name = HashMap::new();
        for (idx, connector) in connectors.iter().enumerate() {
            for definition in connector.tools() {
                if by_name.contains_key(&definition.name) {
                    warn!(
                        tool = %definition.name,
                        connector = %connector.name(),
                        "Duplicate tool name, keeping the first connector's tool"
                    );
                    continue;
                }
                by_name.insert(definition.name.clone(), tools.len());
                tools.push(IndexedTool { definition, connector: idx });
            }
            debug!(connector = %connector.name(), "Connector indexed");
        }
        Self { connectors, tools, by_name }
    }

    /// An empty registry (no tools available).
    pub fn empty() -> Self {
        Self::from_initialised(Vec::new())
    }

    /// Definitions of every routable tool, in discovery order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Names of the connected connectors.
    pub fn connector_names(&self) -> Vec<&str> {
        self.connectors.iter().map(|c| c.name()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.by_name.get(name) {
            return Some(idx);
        }
        let suffix = format!("{NAMESPACE_SEPARATOR}{name}");
        self.tools
            .iter()
            .position(|t| t.definition.name.ends_with(&suffix))
    }

    /// Resolve a requested tool name to `(connector, listed tool name)`.
    pub fn resolve(&self, name: &str) -> Option<(Arc<dyn ToolConnector>, String)> {
        let idx = self.lookup(name).or_else(|| match split_namespace(name) {
            (Some(_), bare) => self.lookup(bare),
            (None, _) => None,
        })?;
        let tool = &self.tools[idx];
        Some((
            Arc::clone(&self.connectors[tool.connector]),
            tool.definition.name.clone(),
        ))
    }

    /// Route a call to the owning connector.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let (connector, listed) = self
            .resolve(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        debug!(
            tool = %name,
            resolved = %listed,
            connector = %connector.name(),
            "Routing tool call"
        );
        connector.call_tool(&listed, arguments).await
    }

    /// Close every connector, logging failures.
    pub async fn close(&self) {
        for connector in &self.connectors {
            if let Err(e) = connector.close().await {
                warn!(connector = %connector.name(), error = %e, "Connector close failed");
            }
        }
    }
}
