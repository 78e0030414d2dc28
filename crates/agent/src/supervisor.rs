//! The linear pipeline: knowledge check → retrieval → tool execution.
//!
//! Each stage leaves one [`TaskResult`] in the task's ledger. A failing
//! knowledge stage aborts the task; a failing retrieval stage aborts it too
//! unless retrieval degradation is enabled, in which case the task goes on
//! with no context. A failing model call aborts the execution stage.

use std::sync::Arc;
use std::time::Instant;

use ragweave_core::error::Error;
use ragweave_telemetry::{NoopTelemetry, Span, SpanKind, TelemetrySink, TraceHandle};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::knowledge::{EmbedReport, KnowledgeAgent};
use crate::retrieval::{RetrievalAgent, RetrievedContext};
use crate::tool_execution::{ToolExecutionAgent, ToolRunResult};
use crate::truncate_chars;

pub const STAGE_KNOWLEDGE: &str = "knowledge_check";
pub const STAGE_RETRIEVAL: &str = "retrieval";
pub const STAGE_EXECUTION: &str = "tool_execution";

// ── Ledger ────────────────────────────────────────────────────────────────

/// The recorded outcome of one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn ok(task_id: &str, data: serde_json::Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(task_id: &str, error: impl ToString) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Append-only list of stage results for one task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskLedger {
    entries: Vec<TaskResult>,
}

impl TaskLedger {
    pub fn record(&mut self, result: TaskResult) {
        self.entries.push(result);
    }

    pub fn entries(&self) -> &[TaskResult] {
        &self.entries
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.entries.iter().find(|e| e.task_id == task_id)
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Aborted { stage: String, error: String },
}

/// Successful vs failed stage counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Everything known about one finished task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    /// The query as it entered the pipeline (after the length guard)
    pub query: String,
    pub final_answer: Option<String>,
    pub status: TaskStatus,
    pub ledger: TaskLedger,
    /// Retrieved context, when retrieval ran
    #[serde(skip)]
    pub context: Option<RetrievedContext>,
    pub processing_time_ms: u64,
    /// Telemetry trace id, empty when telemetry is off
    pub trace_id: String,
}

impl TaskReport {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            succeeded: self.ledger.succeeded(),
            failed: self.ledger.failed(),
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────

pub struct SupervisorOrchestrator {
    knowledge: Arc<KnowledgeAgent>,
    retrieval: Arc<RetrievalAgent>,
    executor: Arc<ToolExecutionAgent>,
    telemetry: Arc<dyn TelemetrySink>,
    degrade_on_retrieval_failure: bool,
    max_query_chars: usize,
    /// Serialises knowledge updates across concurrent tasks
    knowledge_lock: Mutex<()>,
}

impl SupervisorOrchestrator {
    pub fn new(
        knowledge: Arc<KnowledgeAgent>,
        retrieval: Arc<RetrievalAgent>,
        executor: Arc<ToolExecutionAgent>,
    ) -> Self {
        Self {
            knowledge,
            retrieval,
            executor,
            telemetry: Arc::new(NoopTelemetry),
            degrade_on_retrieval_failure: false,
            max_query_chars: 500,
            knowledge_lock: Mutex::new(()),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Continue with empty context when retrieval fails.
    pub fn with_retrieval_degradation(mut self, enabled: bool) -> Self {
        self.degrade_on_retrieval_failure = enabled;
        self
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeAgent> {
        &self.knowledge
    }

    pub fn retrieval(&self) -> &Arc<RetrievalAgent> {
        &self.retrieval
    }

    pub fn executor(&self) -> &Arc<ToolExecutionAgent> {
        &self.executor
    }

    /// Stage 1: embed the knowledge delta if anything changed.
    /// Returns whether anything changed, plus the ingestion report.
    pub async fn check_and_update_knowledge(&self) -> Result<(bool, EmbedReport), Error> {
        let _guard = self.knowledge_lock.lock().await;
        if !self.knowledge.check_for_changes().await? {
            return Ok((false, EmbedReport::default()));
        }
        info!("Knowledge changed, embedding delta");
        Ok((true, self.knowledge.embed_changes().await?))
    }

    /// Force a full re-embed (`rebuild` also clears the collection first).
    pub async fn refresh_knowledge(&self, rebuild: bool) -> Result<EmbedReport, Error> {
        let _guard = self.knowledge_lock.lock().await;
        if rebuild {
            self.knowledge.rebuild().await
        } else {
            Ok(self.knowledge.embed_all().await?)
        }
    }

    /// Stage 2.
    pub async fn retrieve_context(&self, query: &str) -> Result<RetrievedContext, Error> {
        Ok(self
            .retrieval
            .retrieve(query, self.retrieval.top_k(), &TraceHandle::disabled())
            .await?)
    }

    /// Stage 3.
    pub async fn execute_with_tools(
        &self,
        query: &str,
        context: &str,
    ) -> Result<ToolRunResult, Error> {
        self.executor.execute_task(query, context).await
    }

    /// Run the whole pipeline for one user task. Never fails: the report's
    /// status says whether the task completed or where it was aborted.
    pub async fn execute_task(&self, query: &str) -> TaskReport {
        let started = Instant::now();
        let query = self.guard_query(query);
        let trace = TraceHandle::start(Arc::clone(&self.telemetry), &query);
        let mut report = TaskReport {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.clone(),
            final_answer: None,
            status: TaskStatus::Completed,
            ledger: TaskLedger::default(),
            context: None,
            processing_time_ms: 0,
            trace_id: trace.id().to_string(),
        };
        info!(task_id = %report.id, "Task started");

        self.run_stages(&query, &trace, &mut report).await;

        trace.finish(report.is_completed());
        report.processing_time_ms = started.elapsed().as_millis() as u64;
        let summary = report.summary();
        info!(
            task_id = %report.id,
            completed = report.is_completed(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = report.processing_time_ms,
            "Task finished"
        );
        report
    }

    async fn run_stages(&self, query: &str, trace: &TraceHandle, report: &mut TaskReport) {
        if query.trim().is_empty() {
            report.status = TaskStatus::Aborted {
                stage: "input".into(),
                error: "query is empty".into(),
            };
            return;
        }

        // ── Stage 1: knowledge ──
        let span = Span::new(SpanKind::Stage, STAGE_KNOWLEDGE);
        match self.check_and_update_knowledge().await {
            Ok((changed, embed)) => {
                trace.record(span.finished(true));
                report.ledger.record(TaskResult::ok(
                    STAGE_KNOWLEDGE,
                    serde_json::json!({
                        "changed": changed,
                        "embedded_files": embed.embedded_files,
                        "failed_files": embed.failed_files,
                        "removed_files": embed.removed_files,
                        "documents": embed.documents,
                        "degraded_documents": embed.degraded_documents,
                    }),
                ));
            }
            Err(e) => {
                trace.record(span.with_meta("error", e.to_string()).finished(false));
                self.abort(report, STAGE_KNOWLEDGE, e);
                return;
            }
        }

        // ── Stage 2: retrieval ──
        let span = Span::new(SpanKind::Stage, STAGE_RETRIEVAL);
        let context = match self.retrieval.retrieve(query, self.retrieval.top_k(), trace).await {
            Ok(context) => {
                trace.record(span.finished(true));
                report.ledger.record(TaskResult::ok(
                    STAGE_RETRIEVAL,
                    serde_json::json!({
                        "documents": context.documents.len(),
                        "degraded": context.degraded,
                    }),
                ));
                context
            }
            Err(e) if self.degrade_on_retrieval_failure => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                trace.record(span.with_meta("error", e.to_string()).finished(false));
                report.ledger.record(TaskResult::failed(STAGE_RETRIEVAL, &e));
                RetrievedContext::empty()
            }
            Err(e) => {
                trace.record(span.with_meta("error", e.to_string()).finished(false));
                self.abort(report, STAGE_RETRIEVAL, e.into());
                return;
            }
        };

        // ── Stage 3: tool execution ──
        let span = Span::new(SpanKind::Stage, STAGE_EXECUTION);
        let outcome = self.executor.execute_task_traced(query, &context.text, trace).await;
        report.context = Some(context);
        match outcome {
            Ok(run) => {
                trace.record(span.finished(true));
                report.ledger.record(TaskResult::ok(
                    STAGE_EXECUTION,
                    serde_json::json!({
                        "rounds": run.rounds,
                        "tool_calls": run.tool_calls,
                        "failed_tool_calls": run.failed_tool_calls,
                    }),
                ));
                report.final_answer = Some(run.answer);
            }
            Err(e) => {
                trace.record(span.with_meta("error", e.to_string()).finished(false));
                self.abort(report, STAGE_EXECUTION, e);
            }
        }
    }

    fn abort(&self, report: &mut TaskReport, stage: &str, cause: Error) {
        report.ledger.record(TaskResult::failed(stage, &cause));
        let err = Error::stage(stage, cause);
        error!(task_id = %report.id, stage, error = %err, "Task aborted");
        report.status = TaskStatus::Aborted {
            stage: stage.to_string(),
            error: err.to_string(),
        };
    }

    fn guard_query(&self, query: &str) -> String {
        let guarded = truncate_chars(query, self.max_query_chars);
        if guarded.len() < query.len() {
            warn!(max_chars = self.max_query_chars, "Query truncated");
        }
        guarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding_retriever::EmbeddingRetriever;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use ragweave_core::connector::ConnectorRegistry;
    use ragweave_core::error::VectorStoreError;
    use ragweave_core::provider::Provider;
    use ragweave_core::vector::VectorStore;
    use ragweave_telemetry::TelemetryEngine;
    use ragweave_vectorstore::InMemoryVectorStore;

    /// A store whose searches always fail.
    struct BrokenSearchStore(InMemoryVectorStore);

    #[async_trait]
    impl VectorStore for BrokenSearchStore {
        fn name(&self) -> &str {
            "broken"
        }
        fn dimension(&self) -> usize {
            self.0.dimension()
        }
        async fn add_embedding(
            &self,
            embedding: Vec<f32>,
            text: String,
        ) -> Result<(), VectorStoreError> {
            self.0.add_embedding(embedding, text).await
        }
        async fn search(
            &self,
            _embedding: &[f32],
            _top_k: usize,
        ) -> Result<Vec<String>, VectorStoreError> {
            Err(VectorStoreError::QueryFailed("index offline".into()))
        }
        async fn count(&self) -> Result<usize, VectorStoreError> {
            self.0.count().await
        }
        async fn reset(&self) -> Result<(), VectorStoreError> {
            self.0.reset().await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
    }

    fn knowledge_dir(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("knowledge");
        std::fs::create_dir_all(&root).unwrap();
        for (name, body) in files {
            std::fs::write(root.join(name), body).unwrap();
        }
        Fixture { _dir: dir, root }
    }

    async fn supervisor(
        root: &std::path::Path,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn Provider>,
        connectors: Vec<Box<dyn ragweave_core::connector::ToolConnector>>,
    ) -> SupervisorOrchestrator {
        let retriever = Arc::new(EmbeddingRetriever::new(
            Arc::new(StaticEmbeddingProvider::new(16)),
            store,
            "embed",
            16,
        ));
        let knowledge = Arc::new(KnowledgeAgent::new(root, retriever.clone()));
        let retrieval = Arc::new(RetrievalAgent::new(retriever));
        let registry = Arc::new(ConnectorRegistry::connect(connectors).await);
        let executor = Arc::new(ToolExecutionAgent::new(chat, "m", registry));
        SupervisorOrchestrator::new(knowledge, retrieval, executor)
    }

    #[tokio::test]
    async fn full_pipeline_completes_with_three_ledger_entries() {
        let fx = knowledge_dir(&[("rust.md", "Rust is a systems language")]);
        let chat = Arc::new(SequentialMockProvider::single_text("Rust is a language."));
        let store = Arc::new(InMemoryVectorStore::new(16));
        let sup = supervisor(&fx.root, store, chat.clone(), vec![]).await;

        let report = sup.execute_task("What is Rust?").await;
        assert!(report.is_completed());
        assert_eq!(report.final_answer.as_deref(), Some("Rust is a language."));
        assert_eq!(report.summary(), LedgerSummary { succeeded: 3, failed: 0 });
        let knowledge = report.ledger.get(STAGE_KNOWLEDGE).unwrap();
        assert_eq!(knowledge.data.as_ref().unwrap()["embedded_files"], 1);

        // Retrieved context reached the system prompt
        let system = &chat.requests()[0].messages[0].content;
        assert!(system.contains("Rust is a systems language"));
    }

    #[tokio::test]
    async fn knowledge_check_is_idempotent() {
        let fx = knowledge_dir(&[("a.md", "hello")]);
        let sup = supervisor(
            &fx.root,
            Arc::new(InMemoryVectorStore::new(16)),
            Arc::new(SequentialMockProvider::single_text("x")),
            vec![],
        )
        .await;
        let (first, _) = sup.check_and_update_knowledge().await.unwrap();
        let (second, report) = sup.check_and_update_knowledge().await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(report, EmbedReport::default());
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_before_tools() {
        let fx = knowledge_dir(&[]);
        let chat = Arc::new(SequentialMockProvider::new(vec![]));
        let store = Arc::new(BrokenSearchStore(InMemoryVectorStore::new(16)));
        let sup = supervisor(&fx.root, store, chat.clone(), vec![]).await;

        let report = sup.execute_task("q").await;
        match &report.status {
            TaskStatus::Aborted { stage, error } => {
                assert_eq!(stage, STAGE_RETRIEVAL);
                assert!(error.contains("index offline"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(report.summary(), LedgerSummary { succeeded: 1, failed: 1 });
        assert_eq!(chat.call_count(), 0);
        assert!(report.final_answer.is_none());
    }

    #[tokio::test]
    async fn retrieval_failure_can_degrade_to_no_context() {
        let fx = knowledge_dir(&[]);
        let chat = Arc::new(SequentialMockProvider::single_text("best effort"));
        let store = Arc::new(BrokenSearchStore(InMemoryVectorStore::new(16)));
        let sup = supervisor(&fx.root, store, chat.clone(), vec![])
            .await
            .with_retrieval_degradation(true);

        let report = sup.execute_task("q").await;
        assert!(report.is_completed());
        assert_eq!(report.final_answer.as_deref(), Some("best effort"));
        assert!(!report.ledger.get(STAGE_RETRIEVAL).unwrap().success);
        assert!(chat.requests()[0].messages[0].content.contains("No relevant context found."));
    }

    #[tokio::test]
    async fn missing_knowledge_root_aborts_at_stage_one() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(
            &dir.path().join("nope"),
            Arc::new(InMemoryVectorStore::new(16)),
            Arc::new(SequentialMockProvider::new(vec![])),
            vec![],
        )
        .await;
        let report = sup.execute_task("q").await;
        assert!(matches!(
            report.status,
            TaskStatus::Aborted { ref stage, .. } if stage == STAGE_KNOWLEDGE
        ));
        assert_eq!(report.ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_aborts_execution_stage() {
        let fx = knowledge_dir(&[]);
        let store = Arc::new(InMemoryVectorStore::new(16));
        let sup = supervisor(&fx.root, store, Arc::new(FailingProvider), vec![]).await;
        let report = sup.execute_task("q").await;
        assert!(matches!(
            report.status,
            TaskStatus::Aborted { ref stage, .. } if stage == STAGE_EXECUTION
        ));
        assert_eq!(report.summary(), LedgerSummary { succeeded: 2, failed: 1 });
    }

    #[tokio::test]
    async fn long_queries_are_truncated_and_empty_ones_rejected() {
        let fx = knowledge_dir(&[]);
        let chat = Arc::new(SequentialMockProvider::single_text("ok"));
        let sup = supervisor(&fx.root, Arc::new(InMemoryVectorStore::new(16)), chat.clone(), vec![])
            .await
            .with_max_query_chars(10);

        let report = sup.execute_task(&"x".repeat(50)).await;
        assert_eq!(report.query.len(), 10);
        assert_eq!(chat.requests()[0].messages[1].content, "x".repeat(10));

        let report = sup.execute_task("   ").await;
        assert!(matches!(report.status, TaskStatus::Aborted { ref stage, .. } if stage == "input"));
    }

    #[tokio::test]
    async fn telemetry_records_stage_spans() {
        let fx = knowledge_dir(&[("a.md", "alpha")]);
        let engine = Arc::new(TelemetryEngine::new());
        let sup = supervisor(
            &fx.root,
            Arc::new(InMemoryVectorStore::new(16)),
            Arc::new(SequentialMockProvider::single_text("ok")),
            vec![],
        )
        .await
        .with_telemetry(engine.clone());

        let report = sup.execute_task("alpha?").await;
        let trace = engine.get_trace(&report.trace_id).unwrap();
        assert_eq!(trace.stage_labels(), vec![STAGE_KNOWLEDGE, STAGE_RETRIEVAL, STAGE_EXECUTION]);
        assert_eq!(trace.count(SpanKind::Embedding), 1);
        assert_eq!(trace.count(SpanKind::Retrieval), 1);
        assert_eq!(trace.count(SpanKind::LlmCall), 1);
        assert_eq!(trace.success, Some(true));
    }

    #[tokio::test]
    async fn tool_calls_flow_through_pipeline() {
        let fx = knowledge_dir(&[]);
        let connector =
            ScriptedConnector::new("local").with_tool("file_write", "Successfully wrote 5 bytes");
        let calls = connector.calls();
        let chat = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call(
                "file_write",
                serde_json::json!({"filename": "a.txt", "content": "hello"}),
            )],
            "Saved.",
        ));
        let store = Arc::new(InMemoryVectorStore::new(16));
        let sup = supervisor(&fx.root, store, chat, vec![Box::new(connector)]).await;

        let report = sup.execute_task("save hello").await;
        assert_eq!(report.final_answer.as_deref(), Some("Saved."));
        assert_eq!(calls.lock().unwrap().len(), 1);
        let exec = report.ledger.get(STAGE_EXECUTION).unwrap();
        assert_eq!(exec.data.as_ref().unwrap()["tool_calls"], 1);
    }
}
