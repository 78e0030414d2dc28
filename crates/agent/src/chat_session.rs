//! One conversation against the model endpoint.

use std::sync::Arc;

use ragweave_core::error::ProviderError;
use ragweave_core::message::{Conversation, Message, MessageToolCall};
use ragweave_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use tracing::debug;

/// What the model produced for one turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub content: String,
    /// Requested tool invocations, in the model's order
    pub tool_calls: Vec<MessageToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
}

/// Owns an append-only message history and sends it to the model.
pub struct ChatSession {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
    conversation: Conversation,
}

impl ChatSession {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            tools: Vec::new(),
            conversation: Conversation::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Tools offered to the model on every turn.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.conversation.push(Message::system(prompt));
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.conversation.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<MessageToolCall>) {
        self.conversation.push(Message::assistant_with_tools(content, tool_calls));
    }

    pub fn push_tool_result(&mut self, call_id: &str, content: impl Into<String>) {
        self.conversation.push(Message::tool_result(call_id, content));
    }

    /// Send the full history and return the model's turn without recording it.
    pub async fn request_turn(&self) -> Result<Turn, ProviderError> {
        let mut request = ProviderRequest::new(&self.model, self.conversation.messages().to_vec());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        if !self.tools.is_empty() {
            request.tools = self.tools.clone();
            request.tool_choice = Some("auto".into());
        }

        debug!(
            messages = self.conversation.len(),
            tools = self.tools.len(),
            "Requesting model turn"
        );
        let response = self.provider.complete(request).await?;
        Ok(Turn {
            content: response.message.content,
            tool_calls: response.message.tool_calls,
            usage: response.usage,
            model: response.model,
        })
    }

    /// Append a user message, ask the model and record its reply.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<Turn, ProviderError> {
        self.push_user(text);
        let turn = self.request_turn().await?;
        self.push_assistant(turn.content.clone(), turn.tool_calls.clone());
        Ok(turn)
    }
}
