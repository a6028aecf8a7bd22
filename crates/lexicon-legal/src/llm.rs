//! Remote model adapters
//!
//! OpenAI-compatible chat completions (JSON response format) and Ollama chat
//! (`format` set to the response schema). Both report failures as
//! [`CompletionFailure`] so the retry loop can tell transient from fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lexicon_core::{
    CompletionFailure, CompletionRequest, LexiconError, LlmClient, LlmConfig, LlmProvider, Result,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| LexiconError::Config("OpenAI API key required".to_string()))?;

        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionFailure> {
        let body = OpenAiRequest {
            model: &self.model,
            messages: vec![
                Message::new("system", &request.system),
                Message::new("user", &request.prompt),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(send_failure)?;

        if !response.status().is_success() {
            return Err(status_failure(response).await);
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| CompletionFailure::Malformed(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CompletionFailure::Malformed("No response generated".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama chat client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    /// Either `"json"` or a JSON schema
    format: Value,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Message,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionFailure> {
        let body = OllamaRequest {
            model: &self.model,
            messages: vec![
                Message::new("system", &request.system),
                Message::new("user", &request.prompt),
            ],
            stream: false,
            format: request
                .schema
                .clone()
                .unwrap_or_else(|| Value::String("json".to_string())),
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(send_failure)?;

        if !response.status().is_success() {
            return Err(status_failure(response).await);
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            CompletionFailure::Malformed(format!("Failed to parse Ollama response: {e}"))
        })?;

        Ok(result.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LexiconError::Config(format!("Failed to create HTTP client: {e}")))
}

fn send_failure(error: reqwest::Error) -> CompletionFailure {
    if error.is_timeout() {
        CompletionFailure::Timeout
    } else {
        CompletionFailure::Transport(error.to_string())
    }
}

async fn status_failure(response: reqwest::Response) -> CompletionFailure {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = response.text().await.unwrap_or_default();
    classify_status(status, retry_after, message)
}

/// Map a non-success HTTP status onto a failure kind
pub fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    message: String,
) -> CompletionFailure {
    match status {
        429 => CompletionFailure::RateLimited { retry_after },
        408 => CompletionFailure::Timeout,
        500..=u16::MAX => CompletionFailure::Server { status, message },
        _ => CompletionFailure::Rejected { status, message },
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a remote model client from config
///
/// Returns `Ok(None)` when the provider needs an API key and none is set.
pub fn create_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    if !config.is_configured() {
        return Ok(None);
    }

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => Arc::new(OpenAiClient::from_config(config)?),
        LlmProvider::Ollama => Arc::new(OllamaClient::from_config(config)?),
    };
    Ok(Some(client))
}

// ============================================================================
// Tests
// ============================================================================
