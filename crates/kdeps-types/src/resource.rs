//! Resource model and the tagged-union run configuration.
//!
//! A resource runs exactly one *primary* action ([`RunKind`]) and may additionally
//! return an API response. [`RunConfig`] is only ever built through
//! [`RunConfigBuilder`], which rejects a second primary variant, and serde goes
//! through the same builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::ValidationRules;
use crate::{KdepsError, Result};

pub const MULTIPLE_PRIMARY_MESSAGE: &str =
    "resource can only specify one primary execution type (chat, httpClient, sql, python, exec, tts)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ResourceMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Action IDs this resource depends on.
    #[serde(default)]
    pub requires: Vec<String>,
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// The mutually exclusive primary actions a resource can perform.
#[derive(Debug, Clone, PartialEq)]
pub enum RunKind {
    Chat(ChatConfig),
    HttpClient(HttpClientConfig),
    Sql(SqlConfig),
    Python(PythonConfig),
    Exec(ExecConfig),
    Tts(TtsConfig),
}

impl RunKind {
    /// The YAML key this variant is written under.
    pub fn name(&self) -> &'static str {
        match self {
            RunKind::Chat(_) => "chat",
            RunKind::HttpClient(_) => "httpClient",
            RunKind::Sql(_) => "sql",
            RunKind::Python(_) => "python",
            RunKind::Exec(_) => "exec",
            RunKind::Tts(_) => "tts",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRunConfig", into = "RawRunConfig")]
pub struct RunConfig {
    pub primary: Option<RunKind>,
    pub api_response: Option<ApiResponseConfig>,
    pub options: RunOptions,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// True when neither a primary action nor an API response is configured.
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.api_response.is_none()
    }

    pub fn chat(&self) -> Option<&ChatConfig> {
        match &self.primary {
            Some(RunKind::Chat(c)) => Some(c),
            _ => None,
        }
    }

    pub fn sql(&self) -> Option<&SqlConfig> {
        match &self.primary {
            Some(RunKind::Sql(s)) => Some(s),
            _ => None,
        }
    }

    pub fn http_client(&self) -> Option<&HttpClientConfig> {
        match &self.primary {
            Some(RunKind::HttpClient(h)) => Some(h),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    primary: Option<RunKind>,
    api_response: Option<ApiResponseConfig>,
    options: RunOptions,
}

impl RunConfigBuilder {
    /// Sets the primary action. Fails if one is already set.
    pub fn primary(mut self, kind: RunKind) -> Result<Self> {
        if self.primary.is_some() {
            return Err(KdepsError::InvalidResource(MULTIPLE_PRIMARY_MESSAGE.to_string()));
        }
        self.primary = Some(kind);
        Ok(self)
    }

    pub fn api_response(mut self, response: ApiResponseConfig) -> Self {
        self.api_response = Some(response);
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> RunConfig {
        RunConfig {
            primary: self.primary,
            api_response: self.api_response,
            options: self.options,
        }
    }
}

/// Wire shape of `run:`; every variant is an independent optional key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chat: Option<ChatConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_client: Option<HttpClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql: Option<SqlConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    python: Option<PythonConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exec: Option<ExecConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tts: Option<TtsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_response: Option<ApiResponseConfig>,
    #[serde(flatten)]
    options: RunOptions,
}

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = KdepsError;

    fn try_from(raw: RawRunConfig) -> Result<Self> {
        let kinds = [
            raw.chat.map(RunKind::Chat),
            raw.http_client.map(RunKind::HttpClient),
            raw.sql.map(RunKind::Sql),
            raw.python.map(RunKind::Python),
            raw.exec.map(RunKind::Exec),
            raw.tts.map(RunKind::Tts),
        ];

        let mut builder = RunConfig::builder().options(raw.options);
        for kind in kinds.into_iter().flatten() {
            builder = builder.primary(kind)?;
        }
        if let Some(response) = raw.api_response {
            builder = builder.api_response(response);
        }
        Ok(builder.build())
    }
}

impl From<RunConfig> for RawRunConfig {
    fn from(run: RunConfig) -> Self {
        let mut raw = RawRunConfig {
            api_response: run.api_response,
            options: run.options,
            ..Default::default()
        };
        match run.primary {
            Some(RunKind::Chat(c)) => raw.chat = Some(c),
            Some(RunKind::HttpClient(h)) => raw.http_client = Some(h),
            Some(RunKind::Sql(s)) => raw.sql = Some(s),
            Some(RunKind::Python(p)) => raw.python = Some(p),
            Some(RunKind::Exec(e)) => raw.exec = Some(e),
            Some(RunKind::Tts(t)) => raw.tts = Some(t),
            None => {}
        }
        raw
    }
}

/// Settings shared by every kind of run block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrict_to_http_methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrict_to_routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_condition: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_check: Option<PreflightCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expr_before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expr: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expr_after: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnErrorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightCheck {
    #[serde(default)]
    pub validations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnErrorConfig {
    /// `continue`, `fail`, or `retry`.
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Primary action configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenario: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default)]
    pub json_response: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_response_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTool {
    pub name: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ToolParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolParameter {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpClientConfig {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<HttpCacheConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlConfig {
    /// Key into `settings.sqlConnections`.
    #[serde(default)]
    pub connection_name: String,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<serde_json::Value>,
    #[serde(default)]
    pub transaction: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<SqlQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQuery {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonConfig {
    #[serde(default)]
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsConfig {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponseConfig {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}
