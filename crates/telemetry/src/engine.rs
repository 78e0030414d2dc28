//! Thread-safe trace collection.

use std::sync::{Arc, PoisonError, RwLock};

use crate::TelemetryError;
use crate::model::*;

/// Where orchestration reports traces and spans.
///
/// Implementations must never fail the caller; reporting problems are
/// swallowed or logged.
pub trait TelemetrySink: Send + Sync {
    /// Open a trace and return its id.
    fn start_trace(&self, label: &str) -> String;

    /// Attach a finished span to a trace. Unknown trace ids are ignored.
    fn record_span(&self, trace_id: &str, span: Span);

    /// Close a trace with its overall outcome.
    fn end_trace(&self, trace_id: &str, success: bool);
}

/// Discards everything. Used when telemetry is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn start_trace(&self, _label: &str) -> String {
        String::new()
    }

    fn record_span(&self, _trace_id: &str, _span: Span) {}

    fn end_trace(&self, _trace_id: &str, _success: bool) {}
}

/// One open trace plus the sink it reports to.
///
/// Passed explicitly into each pipeline stage. A disabled handle reports to
/// [`NoopTelemetry`].
#[derive(Clone)]
pub struct TraceHandle {
    sink: Arc<dyn TelemetrySink>,
    trace_id: String,
}

impl TraceHandle {
    /// Open a new trace on `sink`.
    pub fn start(sink: Arc<dyn TelemetrySink>, label: &str) -> Self {
        let trace_id = sink.start_trace(label);
        Self { sink, trace_id }
    }

    pub fn disabled() -> Self {
        Self {
            sink: Arc::new(NoopTelemetry),
            trace_id: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.trace_id
    }

    pub fn record(&self, span: Span) {
        self.sink.record_span(&self.trace_id, span);
    }

    pub fn finish(&self, success: bool) {
        self.sink.end_trace(&self.trace_id, success);
    }
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle").field("trace_id", &self.trace_id).finish()
    }
}

/// Most traces kept in memory before completed ones are pruned.
const MAX_TRACES: usize = 5_000;

/// In-memory telemetry engine.
///
/// Thread-safe via `RwLock`. Keeps recent traces and running totals.
pub struct TelemetryEngine {
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    totals: RwLock<UsageSnapshot>,
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            totals: RwLock::new(UsageSnapshot::default()),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Result<Trace, TelemetryError> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces
            .iter()
            .find(|t| t.id == trace_id)
            .cloned()
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))
    }

    /// Recent traces, most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.iter().rev().take(limit).cloned().collect()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.totals.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Serialize a trace for export.
    pub fn export_trace(&self, trace_id: &str) -> Result<String, TelemetryError> {
        let trace = self.get_trace(trace_id)?;
        Ok(serde_json::to_string_pretty(&trace)?)
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for TelemetryEngine {
    fn start_trace(&self, label: &str) -> String {
        let trace = Trace::new(label);
        let id = trace.id.clone();
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);

        if traces.len() >= MAX_TRACES {
            // Drop the oldest completed traces first
            let drain_count = MAX_TRACES / 10;
            let mut removed = 0;
            traces.retain(|t| {
                if removed < drain_count && t.ended_at.is_some() {
                    removed += 1;
                    return false;
                }
                true
            });
        }

        traces.push(trace);
        self.totals.write().unwrap_or_else(PoisonError::into_inner).trace_count += 1;
        id
    }

    fn record_span(&self, trace_id: &str, span: Span) {
        {
            let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
            totals.input_tokens += span.input_tokens.unwrap_or(0) as u64;
            totals.output_tokens += span.output_tokens.unwrap_or(0) as u64;
            match span.kind {
                SpanKind::LlmCall => totals.llm_calls += 1,
                SpanKind::ToolExecution => {
                    totals.tool_executions += 1;
                    if span.success == Some(false) {
                        totals.failed_tool_executions += 1;
                    }
                }
                SpanKind::Embedding => totals.embeddings += 1,
                SpanKind::Retrieval => totals.retrievals += 1,
                SpanKind::Stage => {}
            }
        }

        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        match traces.iter_mut().find(|t| t.id == trace_id) {
            Some(trace) => trace.add_span(span),
            None => {
                tracing::debug!(trace_id, label = %span.label, "Span for unknown trace dropped")
            }
        }
    }

    fn end_trace(&self, trace_id: &str, success: bool) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end(success);
            if !success {
                self.totals.write().unwrap_or_else(PoisonError::into_inner).failed_traces += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_end_trace() {
        let engine = TelemetryEngine::new();
        let id = engine.start_trace("question");
        assert_eq!(engine.trace_count(), 1);

        engine.end_trace(&id, true);
        let trace = engine.get_trace(&id).unwrap();
        assert!(trace.ended_at.is_some());
        assert_eq!(trace.success, Some(true));
    }

    #[test]
    fn record_span_updates_totals() {
        let engine = TelemetryEngine::new();
        let id = engine.start_trace("q");

        let mut llm = Span::new(SpanKind::LlmCall, "model");
        llm.record_tokens(100, 20);
        engine.record_span(&id, llm.finished(true));
        engine.record_span(&id, Span::new(SpanKind::ToolExecution, "file_write").finished(false));
        engine.record_span(&id, Span::new(SpanKind::Embedding, "query").finished(true));
        engine.end_trace(&id, false);

        let usage = engine.usage_snapshot();
        assert_eq!(usage.llm_calls, 1);
        assert_eq!(usage.tool_executions, 1);
        assert_eq!(usage.failed_tool_executions, 1);
        assert_eq!(usage.embeddings, 1);
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 20);
        assert_eq!(usage.failed_traces, 1);
        assert_eq!(engine.get_trace(&id).unwrap().spans.len(), 3);
    }

    #[test]
    fn unknown_trace_is_an_error_on_lookup_only() {
        let engine = TelemetryEngine::new();
        engine.record_span("missing", Span::new(SpanKind::Stage, "retrieve"));
        engine.end_trace("missing", true);
        assert!(matches!(
            engine.get_trace("missing"),
            Err(TelemetryError::UnknownTrace(_))
        ));
    }

    #[test]
    fn recent_traces_are_newest_first() {
        let engine = TelemetryEngine::new();
        engine.start_trace("first");
        engine.start_trace("second");
        let recent = engine.recent_traces(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].label, "second");
    }

    #[test]
    fn export_trace_is_json() {
        let engine = TelemetryEngine::new();
        let id = engine.start_trace("q");
        engine.record_span(&id, Span::new(SpanKind::Stage, "execute").finished(true));
        let json = engine.export_trace(&id).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spans"][0]["kind"], "stage");
    }

    #[test]
    fn trace_handle_reports_to_its_sink() {
        let engine = Arc::new(TelemetryEngine::new());
        let handle = TraceHandle::start(engine.clone(), "q");
        handle.record(Span::new(SpanKind::Retrieval, "memory").finished(true));
        handle.finish(true);

        let trace = engine.get_trace(handle.id()).unwrap();
        assert_eq!(trace.spans.len(), 1);
        assert_eq!(trace.success, Some(true));
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let sink = NoopTelemetry;
        let id = sink.start_trace("q");
        sink.record_span(&id, Span::new(SpanKind::Stage, "retrieve"));
        sink.end_trace(&id, true);
        assert!(id.is_empty());
    }
}
