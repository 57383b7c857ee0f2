//! Generative model provider abstraction and implementations.
//!
//! Defines the [`Provider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when no provider is configured.
//! - **[`GeminiProvider`]** — calls the Google Generative Language `generateContent` API,
//!   passing the declared reply schema as `responseSchema`.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible `chat/completions` endpoint.
//!
//! Use [`create_provider`] to instantiate the configured provider.
//!
//! # Failure policy
//!
//! One HTTP request per call. Network errors and non-success statuses are
//! returned once as a [`ProviderError`]; nothing is retried. A successful
//! response with no text yields an empty string, which the gateway treats
//! like any other unparseable reply.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::schema::SchemaDescriptor;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// One request to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
    /// Reply shape, for structured contracts.
    pub schema: Option<SchemaDescriptor>,
}

/// Terminal failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("model provider is disabled")]
    Disabled,
    #[error("Unknown provider kind: {0}")]
    UnknownKind(String),
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier (`"gemini"`, `"openai"`, `"disabled"`).
    fn name(&self) -> &str;

    /// Sends one request and returns the raw reply text.
    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError>;
}

/// Builds the provider selected by `config.kind`.
///
/// API keys are resolved here, so a missing key fails at startup rather
/// than on the first query.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    match config.kind.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledProvider)),
        other => Err(ProviderError::UnknownKind(other.to_string())),
    }
}

fn read_api_key(var: &str) -> Result<String, ProviderError> {
    std::env::var(var).map_err(|_| ProviderError::MissingApiKey(var.to_string()))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ProviderError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            body: body_text,
        });
    }
    Ok(response.json().await?)
}

// ============ Disabled Provider ============

/// A provider that refuses every request.
pub struct DisabledProvider;

#[async_trait]
impl Provider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &ProviderRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Disabled)
    }
}

// ============ Gemini Provider ============

/// Google Generative Language API (`models/{model}:generateContent`).
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: read_api_key(&config.api_key_env)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }
}

/// Request body for `generateContent`.
pub fn gemini_request_body(request: &ProviderRequest) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });
    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    if let Some(schema) = &request.schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema.to_gemini_schema(),
        });
    }
    body
}

/// Concatenated text parts of the first candidate.
pub fn gemini_reply_text(json: &Value) -> String {
    json.pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            request.model
        );
        let builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_json(builder, &gemini_request_body(request)).await?;
        Ok(gemini_reply_text(&json))
    }
}

// ============ OpenAI-compatible Provider ============

/// OpenAI-compatible `chat/completions` endpoint.
///
/// There is no portable way to attach an array schema, so the schema is
/// described in the system message; object schemas also request
/// `response_format: json_object`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: read_api_key(&config.api_key_env)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }
}

/// Request body for `chat/completions`.
pub fn openai_request_body(request: &ProviderRequest) -> Value {
    let mut system = request.system_instruction.clone().unwrap_or_default();
    if let Some(schema) = &request.schema {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(&format!(
            "Respond with JSON only, matching this JSON Schema: {}",
            schema.to_json_schema()
        ));
    }

    let mut messages = Vec::new();
    if !system.is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if matches!(&request.schema, Some(schema) if !schema.is_array()) {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

fn openai_reply_text(json: &Value) -> String {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let builder = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let json = post_json(builder, &openai_request_body(request)).await?;
        Ok(openai_reply_text(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Contract, Recommendation, Refinement};

    fn request(schema: Option<SchemaDescriptor>) -> ProviderRequest {
        ProviderRequest {
            model: "m".to_string(),
            prompt: "hello".to_string(),
            system_instruction: Some("be brief".to_string()),
            schema,
        }
    }

    #[test]
    fn gemini_body_carries_schema_and_instruction() {
        let body = gemini_request_body(&request(Some(Refinement::schema())));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn gemini_body_without_schema_is_free_form() {
        let body = gemini_request_body(&request(None));
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn gemini_reply_joins_parts() {
        let reply = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(gemini_reply_text(&reply), "ab");
        assert_eq!(gemini_reply_text(&json!({ "candidates": [] })), "");
    }

    #[test]
    fn openai_body_uses_json_object_only_for_objects() {
        let object = openai_request_body(&request(Some(Refinement::schema())));
        assert_eq!(object["response_format"]["type"], "json_object");
        assert_eq!(object["messages"][0]["role"], "system");

        let array = openai_request_body(&request(Some(<Vec<Recommendation>>::schema())));
        assert!(array.get("response_format").is_none());
        let system = array["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("\"array\""));
    }

    #[test]
    fn openai_reply_reads_first_choice() {
        let reply = json!({ "choices": [{ "message": { "content": "hi" } }] });
        assert_eq!(openai_reply_text(&reply), "hi");
        assert_eq!(openai_reply_text(&json!({})), "");
    }

    #[tokio::test]
    async fn disabled_provider_always_fails() {
        let err = DisabledProvider.generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Disabled));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let cfg = ProviderConfig {
            api_key_env: "READMATE_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            create_provider(&cfg),
            Err(ProviderError::MissingApiKey(_))
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let cfg = ProviderConfig {
            kind: "carrier-pigeon".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            create_provider(&cfg),
            Err(ProviderError::UnknownKind(kind)) if kind == "carrier-pigeon"
        ));
    }

    #[test]
    fn disabled_kind_builds_disabled_provider() {
        let cfg = ProviderConfig {
            kind: "disabled".to_string(),
            ..ProviderConfig::default()
        };
        assert_eq!(create_provider(&cfg).unwrap().name(), "disabled");
    }
}
