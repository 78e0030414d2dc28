//! Execution tracing for ragweave.
//!
//! Every user task becomes one [`Trace`]; pipeline stages, model calls,
//! embeddings, retrievals and tool executions are recorded as [`Span`]s.
//! Orchestration talks to a [`TelemetrySink`] so reporting can be swapped
//! out (or switched off with [`NoopTelemetry`]) without touching behavior.

pub mod engine;
pub mod model;

pub use engine::{NoopTelemetry, TelemetryEngine, TelemetrySink, TraceHandle};
pub use model::{Span, SpanKind, Trace, UsageSnapshot};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
