//! The tool-calling state machine.
//!
//! ```text
//! AwaitingModel ──(no tool calls)──▶ Done
//!       ▲                │
//!       └──ExecutingTools◀┘ (n ≥ 1 tool calls)
//! ```
//!
//! Every tool call in a turn gets exactly one result message, appended in
//! the model's order before the next model turn. Routing and tool failures
//! become error-shaped results the model can read; only a failing model
//! call ends the run with an error.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use ragweave_config::AppConfig;
use ragweave_core::connector::ConnectorRegistry;
use ragweave_core::error::{Error, ToolError};
use ragweave_core::message::{Conversation, MessageToolCall};
use ragweave_core::provider::Provider;
use ragweave_core::tool::ToolResult;
use ragweave_telemetry::{Span, SpanKind, TraceHandle};
use tracing::{debug, info, warn};

use crate::chat_session::ChatSession;

const DEFAULT_PROMPT: &str = "You are a task-execution assistant. Answer the user's request, \
using the available tools when they help. Use the provided context to inform your answer and \
say so when it does not cover the question. When a tool reports an error, read it and adjust \
instead of repeating the same call.";

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// Outcome of one task run.
#[derive(Debug, Clone)]
pub struct ToolRunResult {
    pub answer: String,
    /// Model turns taken
    pub rounds: usize,
    /// Tool calls executed (including failed ones)
    pub tool_calls: usize,
    pub failed_tool_calls: usize,
    /// The full message log
    pub conversation: Conversation,
}

pub struct ToolExecutionAgent {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    connectors: Arc<ConnectorRegistry>,
    output_dir: PathBuf,
    base_prompt: String,
    max_rounds: usize,
    max_tool_calls: usize,
}

impl ToolExecutionAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        connectors: Arc<ConnectorRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            connectors,
            output_dir: PathBuf::from("output"),
            base_prompt: DEFAULT_PROMPT.to_string(),
            max_rounds: 16,
            max_tool_calls: 64,
        }
    }

    pub fn from_config(
        provider: Arc<dyn Provider>,
        connectors: Arc<ConnectorRegistry>,
        config: &AppConfig,
    ) -> Self {
        let mut agent = Self::new(provider, &config.model.name, connectors)
            .with_temperature(config.model.temperature)
            .with_max_tokens(config.model.max_tokens)
            .with_output_dir(&config.agent.output_dir)
            .with_limits(config.agent.max_rounds, config.agent.max_tool_calls);
        if let Some(prompt) = &config.agent.system_prompt {
            agent.base_prompt = prompt.clone();
        }
        agent
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Cap model rounds and total tool calls per task.
    pub fn with_limits(mut self, max_rounds: usize, max_tool_calls: usize) -> Self {
        self.max_rounds = max_rounds;
        self.max_tool_calls = max_tool_calls;
        self
    }

    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    /// System prompt for a task: instructions, the working-directory
    /// contract, the tool list and the retrieved context.
    pub fn system_prompt(&self, context: &str) -> String {
        let tools = self.connectors.definitions();
        let tool_lines = if tools.is_empty() {
            "(no tools available)".to_string()
        } else {
            tools
                .iter()
                .map(|t| format!("- {}: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            concat!(
                "{}\n\n## Working directory\n",
                "Files written with file_write go to `{}`. Pass a relative `path` or a bare ",
                "`filename`; paths outside that directory are rejected.\n\n",
                "## Tools\n{}\n\n## Context\n{}",
            ),
            self.base_prompt,
            self.output_dir.display(),
            tool_lines,
            context
        )
    }

    /// Run `query` to a final answer.
    pub async fn execute_task(&self, query: &str, context: &str) -> Result<ToolRunResult, Error> {
        self.execute_task_traced(query, context, &TraceHandle::disabled()).await
    }

    pub async fn execute_task_traced(
        &self,
        query: &str,
        context: &str,
        trace: &TraceHandle,
    ) -> Result<ToolRunResult, Error> {
        let mut session = ChatSession::new(Arc::clone(&self.provider), &self.model)
            .with_temperature(self.temperature)
            .with_tools(self.connectors.definitions())
            .with_system_prompt(self.system_prompt(context));
        if let Some(max_tokens) = self.max_tokens {
            session = session.with_max_tokens(max_tokens);
        }
        session.push_user(query);

        let mut state = LoopState::AwaitingModel;
        let mut pending: Vec<MessageToolCall> = Vec::new();
        let mut answer = String::new();
        let mut rounds = 0;
        let mut tool_calls = 0;
        let mut failed_tool_calls = 0;

        while state != LoopState::Done {
            match state {
                LoopState::AwaitingModel => {
                    if rounds >= self.max_rounds {
                        warn!(limit = self.max_rounds, "Tool loop hit the round cap");
                        return Err(Error::MaxRoundsExceeded { limit: self.max_rounds });
                    }
                    rounds += 1;

                    let mut span =
                        Span::new(SpanKind::LlmCall, &self.model).with_meta("round", rounds);
                    let turn = match session.request_turn().await {
                        Ok(turn) => turn,
                        Err(e) => {
                            trace.record(span.with_meta("error", e.to_string()).finished(false));
                            return Err(e.into());
                        }
                    };
                    if let Some(usage) = &turn.usage {
                        span.record_tokens(usage.prompt_tokens, usage.completion_tokens);
                    }
                    trace.record(
                        span.with_meta("tool_calls", turn.tool_calls.len()).finished(true),
                    );

                    if turn.tool_calls.is_empty() {
                        debug!(round = rounds, "Model answered without tool calls");
                        answer = turn.content.clone();
                        session.push_assistant(turn.content, Vec::new());
                        state = LoopState::Done;
                        continue;
                    }

                    let mut calls = turn.tool_calls;
                    normalize_call_ids(&mut calls, rounds);
                    if tool_calls + calls.len() > self.max_tool_calls {
                        warn!(
                            limit = self.max_tool_calls,
                            requested = calls.len(),
                            "Tool loop hit the tool-call cap"
                        );
                        return Err(Error::MaxToolCallsExceeded {
                            limit: self.max_tool_calls,
                        });
                    }
                    debug!(round = rounds, count = calls.len(), "Model requested tool calls");
                    session.push_assistant(turn.content, calls.clone());
                    pending = calls;
                    state = LoopState::ExecutingTools;
                }
                LoopState::ExecutingTools => {
                    for call in pending.drain(..) {
                        let result = self.run_call(&call, trace).await;
                        tool_calls += 1;
                        if !result.success {
                            failed_tool_calls += 1;
                        }
                        session.push_tool_result(&call.id, result.output);
                    }
                    state = LoopState::AwaitingModel;
                }
                LoopState::Done => {}
            }
        }

        info!(rounds, tool_calls, failed_tool_calls, "Task finished");
        Ok(ToolRunResult {
            answer,
            rounds,
            tool_calls,
            failed_tool_calls,
            conversation: session.into_conversation(),
        })
    }

    /// Execute one call. Never fails: problems become error-shaped results.
    async fn run_call(&self, call: &MessageToolCall, trace: &TraceHandle) -> ToolResult {
        let span = Span::new(SpanKind::ToolExecution, &call.name)
            .with_meta("tool_call_id", call.id.clone());

        let outcome = match parse_arguments(&call.arguments) {
            Ok(arguments) => self.connectors.call(&call.name, arguments).await,
            Err(e) => Err(e),
        };
        let result = match outcome {
            Ok(result) => result.for_call(&call.id),
            Err(e) => {
                warn!(tool = %call.name, tool_call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::from_error(&call.id, &call.name, &e)
            }
        };
        trace.record(span.finished(result.success));
        result
    }
}

fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

/// Give every call in a turn a non-empty id unique within the turn.
pub fn normalize_call_ids(calls: &mut [MessageToolCall], round: usize) {
    let mut seen = HashSet::new();
    for (i, call) in calls.iter_mut().enumerate() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            let replacement = format!("call_r{round}_{i}");
            debug!(original = %call.id, replacement = %replacement, "Replacing tool call id");
            call.id = replacement;
            seen.insert(call.id.clone());
        }
    }
}
