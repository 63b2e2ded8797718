//! Shared types for the inference client.
//!
//! Request types mirror the OpenAI Chat Completions API so any compatible
//! runtime (Ollama, llama.cpp, vLLM) can sit behind the classifier.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Per-call generation options passed to [`super::ModelInference::infer`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of output tokens.
    pub max_tokens: u32,
    /// Upper bound on a single call, enforced by the caller and the client.
    pub timeout: Duration,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

/// The request body sent to `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_lowercase_roles() {
        let req = ChatCompletionRequest {
            model: "qwen2.5:7b".into(),
            messages: vec![ChatMessage::system("route"), ChatMessage::user("hi")],
            temperature: 0.4,
            max_tokens: 1000,
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_default_options() {
        let opts = InferenceOptions::default();
        assert_eq!(opts.max_tokens, 1000);
        assert_eq!(opts.timeout, Duration::from_secs(30));
    }
}
