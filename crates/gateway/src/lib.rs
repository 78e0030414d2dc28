//! HTTP API gateway for ragweave.
//!
//! Exposes the orchestrator over REST: a liveness probe, a status page
//! with configuration and knowledge statistics, the query endpoint that
//! runs one task through the pipeline, an embedding trigger, and trace
//! inspection when telemetry is enabled.
//!
//! Built on Axum.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use ragweave_agent::{
    EndpointHealth, KnowledgeStats, Pipeline, TaskResult, TaskStatus, truncate_chars,
};
use ragweave_telemetry::{TelemetryError, UsageSnapshot};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Answers longer than this are cut before they go on the wire.
pub const MAX_RESPONSE_CHARS: usize = 4000;

const TRUNCATION_NOTE: &str = "... [Response truncated due to length]";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: Arc<Pipeline>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            started_at: chrono::Utc::now(),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/query", post(query_handler))
        .route("/v1/embed", post(embed_handler))
        .route("/v1/traces", get(list_traces_handler))
        .route("/v1/traces/{id}", get(get_trace_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and serve until the process is stopped.
pub async fn start(pipeline: Arc<Pipeline>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!(
        "{}:{}",
        pipeline.config.gateway.host, pipeline.config.gateway.port
    );
    let app = build_router(Arc::new(GatewayState::new(pipeline)));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ConfigSummary {
    model: String,
    embedding_model: String,
    embedding_dimension: usize,
    vector_backend: String,
    vector_index: String,
    knowledge_dir: String,
    output_dir: String,
}

#[derive(Serialize)]
struct StatusResponse {
    /// `healthy`, or `degraded` when a model endpoint is unreachable
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    config: ConfigSummary,
    endpoints: EndpointHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    knowledge: Option<KnowledgeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    knowledge_error: Option<String>,
    connectors: Vec<String>,
    tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    telemetry: Option<UsageSnapshot>,
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    /// Echoed back untouched
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    response: String,
    /// `success` or `error`
    status: &'static str,
    processing_time_ms: u64,
    stages: Vec<TaskResult>,
    task_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct EmbedRequest {
    /// Re-embed every file, changed or not
    #[serde(default)]
    force_refresh: bool,
    /// Clear the collection before re-embedding
    #[serde(default)]
    rebuild: bool,
}

#[derive(Serialize)]
struct EmbedResponse {
    /// `completed` or `partial`
    status: &'static str,
    changed: bool,
    embedded_files: usize,
    failed_files: usize,
    removed_files: usize,
    documents: usize,
    degraded_documents: usize,
}

#[derive(Serialize)]
struct TraceSummary {
    id: String,
    label: String,
    spans: usize,
    total_tokens: u32,
    duration_ms: Option<u64>,
    success: Option<bool>,
}

#[derive(Serialize)]
struct TraceListResponse {
    traces: Vec<TraceSummary>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    let pipeline = &state.pipeline;
    let config = &pipeline.config;

    let (knowledge, knowledge_error) = match pipeline.supervisor.knowledge().stats().await {
        Ok(stats) => (Some(stats), None),
        Err(e) => {
            warn!(error = %e, "Knowledge stats unavailable");
            (None, Some(e.to_string()))
        }
    };

    let endpoints = pipeline.endpoint_health().await;
    if !endpoints.model || !endpoints.embedding {
        warn!(
            model = endpoints.model,
            embedding = endpoints.embedding,
            "Model endpoint unreachable"
        );
    }

    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0) as u64;

    Json(StatusResponse {
        status: if endpoints.model && endpoints.embedding { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
        config: ConfigSummary {
            model: config.model.name.clone(),
            embedding_model: config.embedding.model.clone(),
            embedding_dimension: config.embedding.dimension,
            vector_backend: pipeline.store.name().to_string(),
            vector_index: config.vector_store.index_name.clone(),
            knowledge_dir: config.knowledge.dir.display().to_string(),
            output_dir: config.agent.output_dir.display().to_string(),
        },
        endpoints,
        knowledge,
        knowledge_error,
        connectors: pipeline
            .connectors
            .connector_names()
            .into_iter()
            .map(String::from)
            .collect(),
        tools: pipeline
            .connectors
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect(),
        telemetry: pipeline.telemetry.as_ref().map(|t| t.usage_snapshot()),
    })
}

async fn query_handler(
    State(state): State<SharedState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Question cannot be empty"));
    }

    let report = state.pipeline.supervisor.execute_task(&request.question).await;

    let (response, status) = match &report.status {
        TaskStatus::Completed => {
            let answer = report.final_answer.clone().unwrap_or_default();
            (clip_response(answer.trim()), "success")
        }
        TaskStatus::Aborted { stage, error } => {
            error!(task_id = %report.id, stage = %stage, error = %error, "Query failed");
            (format!("Error processing query: {error}"), "error")
        }
    };

    Ok(Json(QueryResponse {
        response,
        status,
        processing_time_ms: report.processing_time_ms,
        stages: report.ledger.entries().to_vec(),
        task_id: report.id,
        trace_id: report.trace_id,
        session_id: request.session_id,
    }))
}

async fn embed_handler(
    State(state): State<SharedState>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let supervisor = &state.pipeline.supervisor;

    let outcome = if request.force_refresh || request.rebuild {
        supervisor
            .refresh_knowledge(request.rebuild)
            .await
            .map(|report| (true, report))
    } else {
        supervisor.check_and_update_knowledge().await
    };

    let (changed, report) = outcome.map_err(|e| {
        error!(error = %e, "Embedding failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Embedding failed: {e}"))
    })?;

    info!(
        changed,
        embedded = report.embedded_files,
        failed = report.failed_files,
        "Embedding request finished"
    );

    Ok(Json(EmbedResponse {
        status: if report.failed_files == 0 { "completed" } else { "partial" },
        changed,
        embedded_files: report.embedded_files,
        failed_files: report.failed_files,
        removed_files: report.removed_files,
        documents: report.documents,
        degraded_documents: report.degraded_documents,
    }))
}

async fn list_traces_handler(
    State(state): State<SharedState>,
) -> Result<Json<TraceListResponse>, ApiError> {
    let telemetry = state
        .pipeline
        .telemetry
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Telemetry is disabled"))?;

    let traces = telemetry
        .recent_traces(50)
        .iter()
        .map(|t| TraceSummary {
            id: t.id.clone(),
            label: t.label.clone(),
            spans: t.spans.len(),
            total_tokens: t.total_tokens(),
            duration_ms: t.duration_ms(),
            success: t.success,
        })
        .collect();

    Ok(Json(TraceListResponse { traces }))
}

async fn get_trace_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let telemetry = state
        .pipeline
        .telemetry
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Telemetry is disabled"))?;

    match telemetry.export_trace(&id) {
        Ok(json) => Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response()),
        Err(e @ TelemetryError::UnknownTrace(_)) => {
            Err(api_error(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => {
            error!(trace_id = %id, error = %e, "Trace export failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn clip_response(answer: &str) -> String {
    if answer.chars().count() <= MAX_RESPONSE_CHARS {
        return answer.to_string();
    }
    warn!(limit = MAX_RESPONSE_CHARS, "Response too long, truncating");
    format!("{}{TRUNCATION_NOTE}", truncate_chars(answer, MAX_RESPONSE_CHARS))
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use ragweave_config::AppConfig;
    use ragweave_core::error::ProviderError;
    use ragweave_core::message::Message;
    use ragweave_core::provider::{
        EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
    };
    use ragweave_vectorstore::InMemoryVectorStore;

    const DIM: usize = 8;

    /// Answers every chat request with fixed text and embeds by byte sums.
    /// A failing mock also reports itself unreachable.
    struct MockProvider {
        response_text: String,
        fail_chat: bool,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            if self.fail_chat {
                return Err(ProviderError::ApiError {
                    status_code: 503,
                    message: "model offline".into(),
                });
            }
            Ok(ProviderResponse {
                message: Message::assistant(&self.response_text),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
                metadata: serde_json::Map::new(),
            })
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            let embeddings = request
                .inputs
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; DIM];
                    for (i, b) in text.bytes().enumerate() {
                        v[i % DIM] += b as f32;
                    }
                    v
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                model: request.model,
                usage: None,
            })
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            Ok(!self.fail_chat)
        }
    }

    async fn test_state(dir: &std::path::Path, answer: &str, fail_chat: bool) -> SharedState {
        let mut config = AppConfig::default();
        config.knowledge.dir = dir.join("knowledge");
        config.agent.output_dir = dir.join("output");
        config.embedding.dimension = DIM;

        let provider: Arc<dyn Provider> = Arc::new(MockProvider {
            response_text: answer.to_string(),
            fail_chat,
        });
        let pipeline = Pipeline::assemble(
            config,
            Arc::clone(&provider),
            provider,
            Arc::new(InMemoryVectorStore::new(DIM)),
            Vec::new(),
        )
        .await
        .unwrap();
        Arc::new(GatewayState::new(Arc::new(pipeline)))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", false).await);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn query_runs_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "The answer is 42.", false).await;
        std::fs::write(dir.path().join("knowledge/facts.md"), "The answer is 42.").unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/v1/query",
                serde_json::json!({ "question": "What is the answer?", "session_id": "s-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["response"], "The answer is 42.");
        assert_eq!(json["session_id"], "s-1");
        let stages: Vec<&str> = json["stages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["task_id"].as_str().unwrap())
            .collect();
        assert_eq!(stages, vec!["knowledge_check", "retrieval", "tool_execution"]);
        assert_eq!(json["stages"][0]["data"]["embedded_files"], 1);
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", false).await);

        let response = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "question": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_task_reports_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "unused", true).await);

        let response = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "question": "hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert!(json["response"].as_str().unwrap().starts_with("Error processing query:"));
        let last = json["stages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["task_id"], "tool_execution");
        assert_eq!(last["success"], false);
    }

    #[tokio::test]
    async fn long_answers_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat(MAX_RESPONSE_CHARS + 100);
        let app = build_router(test_state(dir.path(), &long, false).await);

        let response = app
            .oneshot(post_json("/v1/query", serde_json::json!({ "question": "hello" })))
            .await
            .unwrap();
        let json = body_json(response).await;
        let text = json["response"].as_str().unwrap();
        assert!(text.ends_with(TRUNCATION_NOTE));
        assert_eq!(text.chars().count(), MAX_RESPONSE_CHARS + TRUNCATION_NOTE.chars().count());
    }

    #[tokio::test]
    async fn embed_then_embed_again_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", false).await;
        std::fs::write(dir.path().join("knowledge/a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("knowledge/b.md"), "beta").unwrap();
        let app = build_router(state);

        let first = app
            .clone()
            .oneshot(post_json("/v1/embed", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let json = body_json(first).await;
        assert_eq!(json["changed"], true);
        assert_eq!(json["embedded_files"], 2);
        assert_eq!(json["status"], "completed");

        let second = app
            .clone()
            .oneshot(post_json("/v1/embed", serde_json::json!({ "force_refresh": false })))
            .await
            .unwrap();
        let json = body_json(second).await;
        assert_eq!(json["changed"], false);
        assert_eq!(json["embedded_files"], 0);

        let forced = app
            .oneshot(post_json("/v1/embed", serde_json::json!({ "force_refresh": true })))
            .await
            .unwrap();
        let json = body_json(forced).await;
        assert_eq!(json["changed"], true);
        assert_eq!(json["embedded_files"], 2);
    }

    #[tokio::test]
    async fn status_reports_config_and_knowledge() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", false).await;
        std::fs::write(dir.path().join("knowledge/a.txt"), "alpha").unwrap();
        let app = build_router(state);

        let req = Request::builder().uri("/v1/status").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["endpoints"]["model"], true);
        assert_eq!(json["config"]["embedding_dimension"], DIM);
        assert_eq!(json["knowledge"]["files"], 1);
        assert_eq!(json["knowledge"]["pending_changes"], true);
        assert_eq!(json["telemetry"]["trace_count"], 0);
    }

    #[tokio::test]
    async fn status_is_degraded_when_model_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "unused", true).await);

        let req = Request::builder().uri("/v1/status").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["endpoints"]["model"], false);
        assert_eq!(json["endpoints"]["embedding"], false);
    }

    #[tokio::test]
    async fn traces_are_listed_and_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", false).await);

        let response = app
            .clone()
            .oneshot(post_json("/v1/query", serde_json::json!({ "question": "hello" })))
            .await
            .unwrap();
        let trace_id = body_json(response).await["trace_id"]
            .as_str()
            .unwrap()
            .to_string();

        let req = Request::builder().uri("/v1/traces").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["traces"][0]["id"], trace_id.as_str());

        let req = Request::builder()
            .uri(format!("/v1/traces/{trace_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["id"], trace_id.as_str());
        assert!(!json["spans"].as_array().unwrap().is_empty());

        let req = Request::builder().uri("/v1/traces/missing").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
