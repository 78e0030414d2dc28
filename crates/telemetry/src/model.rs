//! Data model for traces, spans and usage snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// One supervisor pipeline stage.
    Stage,
    /// A chat completion call.
    LlmCall,
    /// A tool invocation through a connector.
    ToolExecution,
    /// An embedding request.
    Embedding,
    /// A vector store lookup.
    Retrieval,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage => write!(f, "stage"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::ToolExecution => write!(f, "tool_execution"),
            Self::Embedding => write!(f, "embedding"),
            Self::Retrieval => write!(f, "retrieval"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier.
    pub id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    /// What kind of work this represents.
    pub kind: SpanKind,
    /// Human-readable label (stage name, tool name, model name).
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// None while still running.
    pub ended_at: Option<DateTime<Utc>>,
    /// Computed on end.
    pub duration_ms: Option<u64>,
    /// Input tokens consumed (model calls only).
    pub input_tokens: Option<u32>,
    /// Output tokens produced (model calls only).
    pub output_tokens: Option<u32>,
    pub success: Option<bool>,
    /// Arbitrary metadata (error text, document counts, degraded flags).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            input_tokens: None,
            output_tokens: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    /// End the span and hand it back, for one-expression recording.
    pub fn finished(mut self, success: bool) -> Self {
        self.end(success);
        self
    }

    pub fn record_tokens(&mut self, input: u32, output: u32) {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
    }

    /// Total tokens (input + output), or 0 if not recorded.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans recorded for one user task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    /// What the trace is about (usually the user question).
    pub label: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Overall outcome, set on end.
    pub success: Option<bool>,
}

impl Trace {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            success: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self, success: bool) {
        self.ended_at = Some(Utc::now());
        self.success = Some(success);
    }

    pub fn total_tokens(&self) -> u32 {
        self.spans.iter().map(|s| s.total_tokens()).sum()
    }

    /// Wall time from start to end, if ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| {
            end.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64
        })
    }

    pub fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    /// Labels of the stage spans in recorded order.
    pub fn stage_labels(&self) -> Vec<&str> {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::Stage)
            .map(|s| s.label.as_str())
            .collect()
    }
}

// ── Usage ─────────────────────────────────────────────────────────────────

/// Running totals since the engine was created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub trace_count: u64,
    pub failed_traces: u64,
    pub llm_calls: u64,
    pub tool_executions: u64,
    pub failed_tool_executions: u64,
    pub embeddings: u64,
    pub retrievals: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
