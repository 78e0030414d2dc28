//! Configuration loading, validation, and management for ragweave.
//!
//! Loads configuration from `~/.ragweave/config.toml` (or an explicit
//! path) and then applies environment variable overrides. The variable
//! names match the ones the deployment scripts already export
//! (`LITELLM_API_KEY`, `EMBEDDING_BASE_URL`, `KNOWLEDGE_DIR`, ...).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion model endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// Embedding endpoint and collection dimension
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store backend selection
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Knowledge directory scanning and ingestion
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Context retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Tool-calling loop limits and working directory
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool connectors. Empty means "the built-in local tools only".
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,

    /// Trace collection
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// HTTP API server
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Model ───────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL (e.g. a LiteLLM proxy)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model_name() -> String {
    "qwen-qwq-32b-preview".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_model_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("name", &self.name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Embedding ───────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Falls back to `model.api_key` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Falls back to `model.base_url` when unset. A URL that already ends
    /// in `/embeddings` is used verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Fixed collection dimension D
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "llamacpp-embedding".into()
}
fn default_dimension() -> usize {
    384
}
fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_embedding_model(),
            dimension: default_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Vector store ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    #[default]
    Sqlite,
    Opensearch,
}

impl std::str::FromStr for VectorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "opensearch" => Ok(Self::Opensearch),
            other => Err(ConfigError::ValidationError(format!(
                "unknown vector store backend '{other}' (expected memory, sqlite or opensearch)"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Collection / index name
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// SQLite database file; defaults to `~/.ragweave/vectors.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opensearch_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opensearch_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opensearch_password: Option<String>,
}

fn default_index_name() -> String {
    "knowledge-embeddings".into()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            index_name: default_index_name(),
            sqlite_path: None,
            opensearch_endpoint: None,
            opensearch_username: None,
            opensearch_password: None,
        }
    }
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("backend", &self.backend)
            .field("index_name", &self.index_name)
            .field("sqlite_path", &self.sqlite_path)
            .field("opensearch_endpoint", &self.opensearch_endpoint)
            .field("opensearch_username", &self.opensearch_username)
            .field("opensearch_password", &redact(&self.opensearch_password))
            .finish()
    }
}

// ── Knowledge ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Root directory scanned recursively
    #[serde(default = "default_knowledge_dir")]
    pub dir: PathBuf,

    /// Eligible file extensions, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Fingerprint side file; defaults to `<dir>/.knowledge_metadata.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<PathBuf>,

    /// Files embedded concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("knowledge")
}
fn default_extensions() -> Vec<String> {
    ["md", "txt", "json", "csv"].iter().map(|s| s.to_string()).collect()
}
fn default_batch_size() -> usize {
    8
}

impl KnowledgeConfig {
    /// Resolved path of the fingerprint side file.
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_file
            .clone()
            .unwrap_or_else(|| self.dir.join(".knowledge_metadata.json"))
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: default_knowledge_dir(),
            extensions: default_extensions(),
            metadata_file: None,
            batch_size: default_batch_size(),
        }
    }
}

// ── Retrieval ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Apply term-frequency re-ranking on top of vector similarity
    #[serde(default)]
    pub rerank: bool,

    /// With re-ranking on, fetch `top_k * candidate_multiplier` candidates first
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Retrieved documents are truncated to this many characters
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

fn default_top_k() -> usize {
    5
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_max_document_chars() -> usize {
    500
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rerank: false,
            candidate_multiplier: default_candidate_multiplier(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

// ── Agent ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Working directory for file-writing tools
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum model turns per task
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Maximum tool invocations per task
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,

    /// Continue with empty context when retrieval fails instead of aborting
    #[serde(default)]
    pub degrade_on_retrieval_failure: bool,

    /// User queries are truncated to this many characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Extra instructions prepended to the generated system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_max_rounds() -> usize {
    16
}
fn default_max_tool_calls() -> usize {
    64
}
fn default_max_query_chars() -> usize {
    500
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_rounds: default_max_rounds(),
            max_tool_calls: default_max_tool_calls(),
            degrade_on_retrieval_failure: false,
            max_query_chars: default_max_query_chars(),
            system_prompt: None,
        }
    }
}

// ── Connectors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Built-in file tools
    Local,
    /// Remote JSON-RPC tool server over HTTP
    McpHttp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,

    pub kind: ConnectorKind,

    /// Server URL (required for `mcp_http`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Prefix applied to listed tool names (`<namespace>___<tool>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ConnectorConfig {
    pub fn local() -> Self {
        Self {
            name: "local".into(),
            kind: ConnectorKind::Local,
            url: None,
            namespace: None,
            enabled: true,
        }
    }
}

// ── Telemetry / gateway ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.ragweave/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, apply environment overrides, then validate.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup. The first variable that
    /// is set wins within each group.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(key) = first(&["RAGWEAVE_API_KEY", "LITELLM_API_KEY", "OPENAI_API_KEY"]) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = first(&["LITELLM_BASE_URL", "OPENAI_BASE_URL"]) {
            self.model.base_url = url;
        }
        if let Some(model) = first(&["REASONING_MODEL", "DEFAULT_MODEL"]) {
            self.model.name = model;
        }

        if let Some(key) = first(&["EMBEDDING_API_KEY"]) {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = first(&["EMBEDDING_BASE_URL"]) {
            self.embedding.base_url = Some(url);
        }
        if let Some(model) = first(&["EMBEDDING_MODEL"]) {
            self.embedding.model = model;
        }
        if let Some(dim) = first(&["EMBEDDING_DIMENSION"]) {
            self.embedding.dimension = parse_number("EMBEDDING_DIMENSION", &dim)?;
        }

        if let Some(backend) = first(&["VECTOR_STORE_BACKEND"]) {
            self.vector_store.backend = backend.parse()?;
        }
        if let Some(index) = first(&["VECTOR_INDEX_NAME"]) {
            self.vector_store.index_name = index;
        }
        if let Some(endpoint) = first(&["OPENSEARCH_ENDPOINT"]) {
            self.vector_store.opensearch_endpoint = Some(endpoint);
        }

        if let Some(dir) = first(&["KNOWLEDGE_DIR"]) {
            self.knowledge.dir = PathBuf::from(dir);
        }
        if let Some(top_k) = first(&["TOP_K_RESULTS"]) {
            self.retrieval.top_k = parse_number("TOP_K_RESULTS", &top_k)?;
        }
        if let Some(dir) = first(&["OUTPUT_DIR"]) {
            self.agent.output_dir = PathBuf::from(dir);
        }

        if let Some(url) = first(&["TAVILY_MCP_SERVICE_URL"]) {
            match self.connectors.iter_mut().find(|c| c.name == "tavily") {
                Some(existing) => existing.url = Some(url),
                None => self.connectors.push(ConnectorConfig {
                    name: "tavily".into(),
                    kind: ConnectorKind::McpHttp,
                    url: Some(url),
                    namespace: Some("tavily".into()),
                    enabled: true,
                }),
            }
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragweave")
    }

    /// SQLite vector database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.vector_store
            .sqlite_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("vectors.db"))
    }

    /// Embedding API key, falling back to the model key.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.model.api_key.as_deref())
    }

    /// Embedding base URL, falling back to the model base URL.
    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.model.base_url)
    }

    /// Enabled connectors. The local connector is always first unless a
    /// `local` entry is configured explicitly (which may disable it).
    pub fn active_connectors(&self) -> Vec<ConnectorConfig> {
        let mut active = Vec::new();
        if !self.connectors.iter().any(|c| c.kind == ConnectorKind::Local) {
            active.push(ConnectorConfig::local());
        }
        active.extend(self.connectors.iter().filter(|c| c.enabled).cloned());
        active
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be > 0".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be > 0".into()));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.candidate_multiplier must be > 0".into(),
            ));
        }
        if self.knowledge.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.batch_size must be > 0".into(),
            ));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError("agent.max_rounds must be > 0".into()));
        }
        if self.vector_store.backend == VectorBackend::Opensearch
            && self.vector_store.opensearch_endpoint.is_none()
        {
            return Err(ConfigError::ValidationError(
                "vector_store.opensearch_endpoint is required for the opensearch backend".into(),
            ));
        }
        for connector in &self.connectors {
            if connector.kind == ConnectorKind::McpHttp && connector.url.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "connector '{}' of kind mcp_http needs a url",
                    connector.name
                )));
            }
        }
        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} must be a positive integer, got '{value}'"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
