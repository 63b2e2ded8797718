//! OpenAI-compatible inference client.
//!
//! The classifier only needs one thing from a model: the raw completion text
//! for a prompt. [`ModelInference`] is that seam; [`InferenceClient`] is the
//! HTTP implementation used in production, and tests substitute scripted fakes.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatMessage, InferenceOptions};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Trait ───────────────────────────────────────────────────────────────────

/// The model-inference capability consumed by the intent classifier.
///
/// Implementations return the model's text verbatim. Interpreting that text
/// (JSON, prose, garbage) is the classifier's job, not the client's.
#[async_trait]
pub trait ModelInference: Send + Sync {
    async fn infer(
        &self,
        messages: &[ChatMessage],
        options: &InferenceOptions,
    ) -> Result<String, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// HTTP client for a single `/chat/completions` endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelConfig,
}

impl InferenceClient {
    /// Build a client for the configured endpoint.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: ModelConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// The base URL of the endpoint.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The model name sent with each request.
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[async_trait]
impl ModelInference for InferenceClient {
    async fn infer(
        &self,
        messages: &[ChatMessage],
        options: &InferenceOptions,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        // Metadata only; prompts carry user conversation text.
        tracing::debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            max_tokens = body.max_tokens,
            "sending classification request"
        );

        let mut request = self.http.post(&url).json(&body).timeout(options.timeout);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_ms: options.timeout.as_millis() as u64,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_content(&body_text)
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Extract the assistant text from a non-streaming completion body.
///
/// Reasoning models put their chain of thought in `reasoning` and the answer
/// in `content`; only `content` is returned. A missing or null `content`
/// yields an empty string, which the classifier treats as unparseable.
pub(crate) fn parse_completion_content(body: &str) -> Result<String, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        choices: Vec<CompletionChoice>,
    }

    #[derive(Deserialize)]
    struct CompletionChoice {
        message: CompletionMessage,
    }

    #[derive(Deserialize)]
    struct CompletionMessage {
        content: Option<String>,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    Ok(choice.message.content.unwrap_or_default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
