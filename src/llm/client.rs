/// HTTP client for the generation backend.
///
/// This module provides `LlmClient` for making synchronous chat-completion
/// requests to an Ollama-compatible API, along with error types and a
/// builder for configuration. The backend's structured-output support (a
/// JSON schema in the request's `format` field) is what enforces the answer
/// contract; callers never rely on prose instructions alone.
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::models::ConversationTurn;

/// Wall-clock ceiling for one generation call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when calling the generation backend.
///
/// Calls are never retried within a request; a failure surfaces to the
/// caller, which may let the user re-ask.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request exceeded the wall-clock ceiling
    #[error("Generation timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Backend responded but the envelope was not usable
    #[error("Backend error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// One chat-completion request to the generation backend.
///
/// `format`, when present, carries a JSON schema the backend must shape its
/// output to. `history` is the bounded conversation window; the current
/// question is kept separate so the transport layer controls final message
/// ordering.
#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub system: String,
    pub history: Vec<ConversationTurn>,
    pub question: String,
    pub format: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for generation backend operations.
///
/// This trait enables mocking in unit tests and provides a clean interface
/// for the answer and study pipelines.
pub trait GenerateClient: Send + Sync {
    /// Runs one chat completion and returns the raw response text.
    fn chat(&self, request: &ChatCompletionRequest) -> Result<String, GenerationError>;
}

/// Builder for constructing `LlmClient` instances.
///
/// # Examples
///
/// ```
/// use tutor::llm::LlmClientBuilder;
///
/// let client = LlmClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct LlmClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
}

impl LlmClientBuilder {
    /// Creates a new `LlmClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the backend API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default model name for generation calls.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the `LlmClient` with the configured settings.
    ///
    /// If `base_url()` was not called, the `TUTOR_LLM_HOST` environment
    /// variable is checked, defaulting to `http://localhost:11434`. The
    /// model falls back to `TUTOR_LLM_MODEL` the same way.
    pub fn build(self) -> Result<LlmClient, GenerationError> {
        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            std::env::var("TUTOR_LLM_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string())
        };

        let model = if let Some(m) = self.model {
            m
        } else {
            std::env::var("TUTOR_LLM_MODEL").unwrap_or_else(|_| String::new())
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| GenerationError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(GenerationError::Network)?;

        Ok(LlmClient {
            client,
            base_url,
            model,
        })
    }
}

/// Synchronous HTTP client for an Ollama-compatible chat API.
///
/// Construct via `LlmClientBuilder`. One request maps to one `/api/chat`
/// call with the system instruction, windowed history and current question
/// as messages, plus sampling options and the optional structured-output
/// schema.
pub struct LlmClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl LlmClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the default model configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Builds the JSON request body for one chat completion.
fn build_request_body(request: &ChatCompletionRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(json!({ "role": "system", "content": request.system }));
    for turn in &request.history {
        messages.push(json!({ "role": turn.role.to_string(), "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.question }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        },
    });
    if let Some(format) = &request.format {
        body["format"] = format.clone();
    }
    body
}

impl GenerateClient for LlmClient {
    fn chat(&self, request: &ChatCompletionRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = build_request_body(request);

        tracing::debug!(
            model = %request.model,
            history_turns = request.history.len(),
            structured = request.format.is_some(),
            "calling generation backend"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e)
                } else {
                    GenerationError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Http {
                status: status.as_u16(),
            });
        }

        let payload: serde_json::Value = response.json().map_err(GenerationError::Network)?;

        payload
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| GenerationError::Api {
                message: "Missing 'message.content' field in API response".to_string(),
            })
    }
}
