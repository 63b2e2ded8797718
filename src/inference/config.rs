//! Model endpoint configuration.
//!
//! One OpenAI-compatible endpoint drives intent classification. Values come
//! from the `model:` section of `switchboard.yaml`, already env-interpolated
//! by [`crate::config::load_config`].

use std::time::Duration;

use serde::Deserialize;

use super::types::InferenceOptions;

/// Runtime configuration for the classification model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL up to and including the API version (e.g. `http://localhost:11434/v1`).
    pub base_url: String,
    /// Model name sent in the request body.
    pub model_name: String,
    /// Bearer token for hosted endpoints. Local runtimes leave this unset.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model_name: "qwen2.5:7b-instruct".to_string(),
            api_key: None,
            temperature: 0.4,
            max_tokens: 1000,
            timeout_ms: 30_000,
        }
    }
}

impl ModelConfig {
    /// The per-call options the classifier sends with every request.
    pub fn inference_options(&self) -> InferenceOptions {
        InferenceOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}
