//! Inference client for a local Ollama instance.
//!
//! Sends the whole conversation to `POST /api/chat` with `stream: false` and
//! waits for the complete reply.

use crate::error::InferenceError;
use crate::session::Turn;
use async_trait::async_trait;
use relay_common::OllamaConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A backend that turns a conversation into the assistant's next message.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Generate the assistant reply for `turns` using `model`.
    async fn generate(&self, model: &str, turns: &[Turn]) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    eval_count: Option<i64>,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Ollama chat client.
pub struct OllamaClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl OllamaClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the Ollama API (e.g. http://localhost:11434)
    /// * `timeout` - Upper bound for a whole request, response body included
    /// * `connect_timeout` - Upper bound for establishing the connection
    pub fn new(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(connect_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(self.timeout)
        } else {
            InferenceError::Unreachable(e.to_string())
        }
    }
}

/// Pull `message.content` out of an Ollama chat response body.
fn parse_chat_response(body: &[u8]) -> Result<String, InferenceError> {
    let parsed: OllamaChatResponse =
        serde_json::from_slice(body).map_err(|e| InferenceError::Malformed(e.to_string()))?;

    if let Some(reason) = parsed.done_reason.as_deref() {
        tracing::trace!(done_reason = %reason, eval_count = ?parsed.eval_count, "Ollama finished");
    }

    parsed
        .message
        .and_then(|m| m.content)
        .ok_or(InferenceError::MissingContent)
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, model: &str, turns: &[Turn]) -> Result<String, InferenceError> {
        let start = Instant::now();
        let request = OllamaChatRequest {
            model,
            messages: turns,
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let content = parse_chat_response(&body)?;

        tracing::debug!(
            model = %model,
            turns = turns.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Ollama reply received"
        );

        Ok(content)
    }
}
