//! Remote tool connector speaking JSON-RPC 2.0 over HTTP.
//!
//! Lifecycle: `initialize` → `notifications/initialized` → `tools/list`
//! (following `nextCursor`) at init, then `tools/call` per invocation.
//! Servers may answer with plain JSON or with a `text/event-stream` body
//! whose `data:` lines carry the JSON-RPC response; both are accepted.
//! A session id handed out in the `Mcp-Session-Id` header is echoed on
//! every later request.
//!
//! If discovery fails the connector still comes up, exposing a single
//! documented fallback tool so the agent keeps some capability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragweave_core::connector::{NAMESPACE_SEPARATOR, ToolConnector};
use ragweave_core::error::ToolError;
use ragweave_core::provider::ToolDefinition;
use ragweave_core::tool::ToolResult;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "Mcp-Session-Id";
/// Upper bound on `tools/list` pages followed during discovery.
const MAX_LIST_PAGES: usize = 32;

/// The tool exposed when discovery fails.
pub fn default_fallback_tool() -> ToolDefinition {
    ToolDefinition {
        name: "web_search".into(),
        description: concat!(
            "Search the web for up-to-date information. ",
            "Returns result titles, URLs and snippets."
        )
        .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum results (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        }),
    }
}

pub struct McpHttpConnector {
    name: String,
    url: String,
    namespace: Option<String>,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    fallback_tool: ToolDefinition,
    /// Listed (possibly namespaced) definitions
    tools: Vec<ToolDefinition>,
    /// Listed name → name the server knows
    remote_names: HashMap<String, String>,
    degraded: bool,
}

impl McpHttpConnector {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            name: name.into(),
            url: url.into(),
            namespace: None,
            client,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
            fallback_tool: default_fallback_tool(),
            tools: Vec::new(),
            remote_names: HashMap::new(),
            degraded: false,
        }
    }

    /// Prefix listed tool names with `<namespace>___`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Replace the tool exposed when discovery fails.
    pub fn with_fallback_tool(mut self, tool: ToolDefinition) -> Self {
        self.fallback_tool = tool;
        self
    }

    /// Whether init fell back to the documented tool.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn listed_name(&self, remote: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}{NAMESPACE_SEPARATOR}{remote}"),
            None => remote.to_string(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ConnectorUnavailable {
            connector: self.name.clone(),
            reason: reason.into(),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ToolError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {status}: {text}")));
        }
        Ok(response)
    }

    /// Send a request and return its `result`.
    async fn rpc(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(connector = %self.name, method, id, "JSON-RPC request");

        let response = self.post(&body).await?;
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|e| self.unavailable(format!("unreadable response: {e}")))?;

        let message = if is_sse {
            find_sse_response(&text, id).ok_or_else(|| {
                self.unavailable(format!("no response for request {id} in event stream"))
            })?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| self.unavailable(format!("invalid JSON-RPC response: {e}")))?
        };

        if let Some(error) = message.get("error") {
            let detail = error["message"].as_str().unwrap_or("unknown error");
            return Err(ToolError::ExecutionFailed {
                tool_name: method.to_string(),
                reason: format!("JSON-RPC error {}: {detail}", error["code"]),
            });
        }
        Ok(message.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        let body = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        self.post(&body).await.map(|_| ())
    }

    async fn discover(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        self.rpc(
            "initialize",
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "ragweave", "version": env!("CARGO_PKG_VERSION") }
            }),
        )
        .await?;
        if let Err(e) = self.notify("notifications/initialized").await {
            debug!(connector = %self.name, error = %e, "initialized notification rejected");
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => serde_json::json!({ "cursor": c }),
                None => serde_json::json!({}),
            };
            let result = self.rpc("tools/list", params).await?;
            tools.extend(parse_tool_list(&result));
            cursor = result["nextCursor"].as_str().map(String::from);
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }
}

/// Pick the JSON-RPC message with `id` out of an SSE body.
fn find_sse_response(body: &str, id: u64) -> Option<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<serde_json::Value>(data.trim()).ok())
        .find(|msg| msg["id"].as_u64() == Some(id))
}

/// `result.tools[]` → definitions. Entries without a name are dropped.
fn parse_tool_list(result: &serde_json::Value) -> Vec<ToolDefinition> {
    result["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| {
                    Some(ToolDefinition {
                        name: t["name"].as_str()?.to_string(),
                        description: t["description"].as_str().unwrap_or_default().to_string(),
                        parameters: t
                            .get("inputSchema")
                            .cloned()
                            .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten `result.content[]` text parts.
fn content_text(result: &serde_json::Value) -> String {
    match result["content"].as_array() {
        Some(parts) => parts
            .iter()
            .map(|p| match p["type"].as_str() {
                Some("text") => p["text"].as_str().unwrap_or_default().to_string(),
                _ => p.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    }
}

#[async_trait]
impl ToolConnector for McpHttpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<(), ToolError> {
        let remote_tools = match self.discover().await {
            Ok(tools) if !tools.is_empty() => tools,
            Ok(_) => {
                warn!(connector = %self.name, "Server listed no tools, exposing fallback tool");
                self.degraded = true;
                vec![self.fallback_tool.clone()]
            }
            Err(e) => {
                warn!(
                    connector = %self.name,
                    url = %self.url,
                    error = %e,
                    "Tool discovery failed, exposing fallback tool"
                );
                self.degraded = true;
                vec![self.fallback_tool.clone()]
            }
        };

        self.tools.clear();
        self.remote_names.clear();
        for mut tool in remote_tools {
            let listed = self.listed_name(&tool.name);
            self.remote_names.insert(listed.clone(), tool.name.clone());
            tool.name = listed;
            self.tools.push(tool);
        }
        info!(
            connector = %self.name,
            tools = self.tools.len(),
            degraded = self.degraded,
            "Connector initialised"
        );
        Ok(())
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let remote = self
            .remote_names
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let result = self
            .rpc("tools/call", serde_json::json!({ "name": remote, "arguments": arguments }))
            .await
            .map_err(|e| match e {
                ToolError::ExecutionFailed { reason, .. } => ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason,
                },
                other => other,
            })?;

        let text = content_text(&result);
        if result["isError"].as_bool().unwrap_or(false) {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: text,
            });
        }
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: text,
            data: result.get("structuredContent").cloned(),
        })
    }

    async fn close(&self) -> Result<(), ToolError> {
        let session = self.session_id.write().await.take();
        if let Some(session) = session {
            let _ = self
                .client
                .delete(&self.url)
                .header(SESSION_HEADER, session)
                .send()
                .await;
        }
        Ok(())
    }
}
