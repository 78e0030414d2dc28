//! Tool trait: a single locally-implemented capability.
//!
//! Built-in tools (file read/write, directory listing) implement [`Tool`]
//! and are grouped in a [`ToolRegistry`]. The registry is then exposed to
//! the tool-calling loop through a connector (see [`crate::connector`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool, with arguments already parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for. Tools leave it empty; the loop fills it in.
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result with plain-text output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A failed result reported by the tool itself (not an exception).
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    /// Build the error-shaped result that is fed back to the model when a
    /// call cannot be routed or the tool raised.
    pub fn from_error(call_id: &str, tool_name: &str, error: &ToolError) -> Self {
        let payload = serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
            "tool": tool_name,
            "tool_call_id": call_id,
        });
        Self {
            call_id: call_id.to_string(),
            success: false,
            output: payload.to_string(),
            data: Some(payload),
        }
    }

    /// Attach the correlation id of the request this answers.
    pub fn for_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// An ordered registry of local tools.
///
/// Registration order is preserved so tool definitions are sent to the
/// model in a stable order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.get(&call.name).ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let result = tool.execute(call.arguments.clone()).await?;
        Ok(result.for_call(call.id.clone()))
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text'".into()))?;
            Ok(ToolResult::ok(text))
        }
    }

    struct ShoutTool;

    #[async_trait]
    impl Tool for ShoutTool {
        fn name(&self) -> &str { "shout" }
        fn description(&self) -> &str { "Upper-cases the input" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(arguments["text"].as_str().unwrap_or("").to_uppercase()))
        }
    }

    #[test]
    fn registry_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ShoutTool));
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.names(), vec!["shout", "echo"]);
        registry.register(Box::new(ShoutTool));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registry_execute_sets_call_id() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn error_result_carries_correlation_id() {
        let err = ToolError::NotFound("write_file".into());
        let result = ToolResult::from_error("call_9", "write_file", &err);
        assert!(!result.success);
        assert_eq!(result.call_id, "call_9");
        let payload: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(payload["tool_call_id"], "call_9");
        assert_eq!(payload["kind"], "tool_not_found");
        assert_eq!(payload["tool"], "write_file");
    }
}
