//! Scripted collaborators shared by the agent tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragweave_core::connector::ToolConnector;
use ragweave_core::error::{ProviderError, ToolError};
use ragweave_core::message::{Message, MessageToolCall};
use ragweave_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ToolDefinition, Usage,
};
use ragweave_core::tool::ToolResult;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if more calls are made than
/// responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers once with plain text (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider that first requests tool calls, then answers.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![make_tool_call_response(tool_calls, ""), make_text_response(answer)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();
        if call >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[call].clone())
    }
}

/// A provider whose every call fails with a server error.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal server error".into(),
        })
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal server error".into(),
        })
    }
}

/// Deterministic bag-of-bytes embeddings: similar text gives similar vectors.
pub struct StaticEmbeddingProvider {
    dimension: usize,
    calls: Mutex<usize>,
}

impl StaticEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for b in text.to_lowercase().bytes().filter(|b| b.is_ascii_alphanumeric()) {
            v[b as usize % self.dimension] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Provider for StaticEmbeddingProvider {
    fn name(&self) -> &str {
        "static_embedding"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("static embedding provider has no chat model".into()))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| self.vector_for(t)).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// A connector with fixed tools and scripted outcomes. Records every call.
pub struct ScriptedConnector {
    name: String,
    tools: Vec<ToolDefinition>,
    outcomes: Vec<(String, Result<String, String>)>,
    calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl ScriptedConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            outcomes: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Expose a tool that succeeds with `output`.
    pub fn with_tool(mut self, tool: &str, output: &str) -> Self {
        self.tools.push(tool_definition(tool));
        self.outcomes.push((tool.to_string(), Ok(output.to_string())));
        self
    }

    /// Expose a tool that raises with `reason`.
    pub fn with_failing_tool(mut self, tool: &str, reason: &str) -> Self {
        self.tools.push(tool_definition(tool));
        self.outcomes.push((tool.to_string(), Err(reason.to_string())));
        self
    }

    /// Shared view of the recorded calls.
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, serde_json::Value)>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ToolConnector for ScriptedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self) -> Result<(), ToolError> {
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
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        match self.outcomes.iter().find(|(tool, _)| tool == name) {
            Some((_, Ok(output))) => Ok(ToolResult::ok(output.clone())),
            Some((_, Err(reason))) => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}

pub fn tool_definition(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!("The {name} tool"),
        parameters: serde_json::json!({"type": "object"}),
    }
}

/// A plain text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A response requesting tool calls, with optional thought content.
pub fn make_tool_call_response(
    tool_calls: Vec<MessageToolCall>,
    thought: &str,
) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A tool call with id `call_<name>`.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
