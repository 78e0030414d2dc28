//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, LiteLLM proxies, llama.cpp servers, vLLM and any
//! endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! Status mapping:
//! - transport failure → `ProviderError::Network`
//! - 429 → `RateLimited`, 401/403 → `AuthenticationFailed`
//! - any other non-2xx → `ApiError`
//! - 2xx with an unusable body → `MalformedResponse`

use std::time::Duration;

use async_trait::async_trait;
use ragweave_core::error::ProviderError;
use ragweave_core::message::{Message, MessageToolCall, Role};
use ragweave_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider with a 120s request timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(120)),
        }
    }

    /// Replace the per-request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.client = build_client(Duration::from_secs(secs));
        self
    }

    /// Chat-completion URL. A base that already names the route is kept.
    pub fn chat_url(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    /// Embeddings URL. A base that already ends in `/embeddings` is kept.
    pub fn embeddings_url(&self) -> String {
        if self.base_url.ends_with("/embeddings") {
            self.base_url.clone()
        } else {
            format!("{}/embeddings", self.base_url)
        }
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn completion_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            if let Some(choice) = &request.tool_choice {
                body["tool_choice"] = serde_json::json!(choice);
            }
        }
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        body
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

/// Turn a parsed completion into our response type.
fn parse_completion(
    api_response: ApiResponse,
) -> std::result::Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

    let tool_calls: Vec<MessageToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| MessageToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let message =
        Message::assistant_with_tools(choice.message.content.unwrap_or_default(), tool_calls);

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        message,
        usage,
        model: api_response.model,
        metadata: serde_json::Map::new(),
    })
}

/// Extract `data[].embedding` from an embeddings response body.
fn parse_embeddings(
    body: &serde_json::Value,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let data = body["data"].as_array().ok_or_else(|| {
        ProviderError::MalformedResponse("Embedding response has no 'data' array".into())
    })?;

    if data.len() < expected {
        return Err(ProviderError::MalformedResponse(format!(
            "Expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.iter()
        .take(expected)
        .enumerate()
        .map(|(i, item)| {
            let values = item["embedding"].as_array().ok_or_else(|| {
                ProviderError::MalformedResponse(format!("data[{i}] has no 'embedding' array"))
            })?;
            if values.is_empty() {
                return Err(ProviderError::MalformedResponse(format!(
                    "data[{i}].embedding is empty"
                )));
            }
            values
                .iter()
                .map(|v| {
                    v.as_f64().map(|f| f as f32).ok_or_else(|| {
                        ProviderError::MalformedResponse(format!(
                            "data[{i}].embedding holds a non-number"
                        ))
                    })
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl ragweave_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.chat_url();
        let body = Self::completion_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self.post_json(&url, &body).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        parse_completion(api_response)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let url = self.embeddings_url();

        // Single inputs go as a plain string; some local servers reject arrays.
        let input = match request.inputs.as_slice() {
            [single] => serde_json::json!(single),
            many => serde_json::json!(many),
        };
        let body = serde_json::json!({
            "model": request.model,
            "input": input,
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post_json(&url, &body).await?;

        let parsed: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        let embeddings = parse_embeddings(&parsed, request.inputs.len())?;

        let usage = parsed.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["prompt_tokens"].as_u64()? as u32,
                completion_tokens: 0,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: parsed["model"].as_str().unwrap_or(&request.model).to_string(),
            usage,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url.trim_end_matches("/embeddings"));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use ragweave_core::Provider;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn embed_request(text: &str) -> EmbeddingRequest {
        EmbeddingRequest {
            model: "llamacpp-embedding".into(),
            inputs: vec![text.into()],
        }
    }

    #[test]
    fn url_rules() {
        let p = OpenAiCompatProvider::new("e", "http://host:8080/v1/", "k");
        assert_eq!(p.embeddings_url(), "http://host:8080/v1/embeddings");
        assert_eq!(p.chat_url(), "http://host:8080/v1/chat/completions");

        let p = OpenAiCompatProvider::new("e", "http://host:8080/v1/embeddings", "k");
        assert_eq!(p.embeddings_url(), "http://host:8080/v1/embeddings");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tools(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "file_write".into(),
                arguments: r#"{"path":"a.txt"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[Message::system("rules"), msg]);
        assert_eq!(api_msgs[0].role, "system");
        let tc = api_msgs[1].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "file_write");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_choice_only_sent_with_tools() {
        let mut req = ProviderRequest::new("m", vec![Message::user("hi")]);
        req.tool_choice = Some("auto".into());
        assert!(OpenAiCompatProvider::completion_body(&req).get("tool_choice").is_none());

        req.tools.push(ToolDefinition {
            name: "file_read".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let body = OpenAiCompatProvider::completion_body(&req);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "file_read");
    }

    #[test]
    fn parse_completion_with_tool_calls() {
        let data = r#"{
            "model": "qwen",
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"id": "call_a", "type": "function",
                    "function": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}}]}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = parse_completion(parsed).unwrap();
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.tool_calls.len(), 1);
        assert_eq!(response.message.tool_calls[0].name, "web_search");
    }

    #[test]
    fn parse_completion_without_choices_is_malformed() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(matches!(parse_completion(parsed), Err(ProviderError::MalformedResponse(_))));
    }

    #[test]
    fn parse_embeddings_cases() {
        let ok = serde_json::json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]});
        assert_eq!(parse_embeddings(&ok, 1).unwrap()[0].len(), 3);

        let missing = serde_json::json!({"data": [{"index": 0}]});
        assert!(matches!(parse_embeddings(&missing, 1), Err(ProviderError::MalformedResponse(_))));

        let no_data = serde_json::json!({"error": "nope"});
        assert!(matches!(parse_embeddings(&no_data, 1), Err(ProviderError::MalformedResponse(_))));

        let strings = serde_json::json!({"data": [{"embedding": ["a"]}]});
        assert!(parse_embeddings(&strings, 1).is_err());
    }

    #[tokio::test]
    async fn embed_over_http() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["input"], "hello");
                Json(serde_json::json!({
                    "data": [{"embedding": [0.5, 0.5, 0.5, 0.5]}],
                    "model": "llamacpp-embedding"
                }))
            }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("embedding", base, "k");
        let response = provider.embed(embed_request("hello")).await.unwrap();
        assert_eq!(response.embeddings, vec![vec![0.5, 0.5, 0.5, 0.5]]);
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("embedding", base, "k");
        let err = provider.embed(embed_request("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 500, .. }));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_failure() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("chat", base, "bad");
        let err = provider
            .complete(ProviderRequest::new("m", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = OpenAiCompatProvider::new("embedding", "http://127.0.0.1:9/v1", "k")
            .with_timeout_secs(2);
        let err = provider.embed(embed_request("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn health_check_probes_models_endpoint() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async { Json(serde_json::json!({ "data": [] })) }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("chat", base.clone(), "k");
        assert!(provider.health_check().await.unwrap());

        let embeddings = OpenAiCompatProvider::new("embedding", format!("{base}/embeddings"), "k");
        assert!(embeddings.health_check().await.unwrap());

        let missing = OpenAiCompatProvider::new("chat", serve(Router::new()).await, "k");
        assert!(!missing.health_check().await.unwrap());
    }
}
