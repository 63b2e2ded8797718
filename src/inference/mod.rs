//! Inference: the model-inference capability behind intent classification.
//!
//! - [`ModelInference`]: async trait returning raw completion text
//! - [`InferenceClient`]: OpenAI-compatible HTTP implementation
//! - [`ModelConfig`]: endpoint and sampling settings from `switchboard.yaml`
//!
//! Switching runtimes (Ollama, llama.cpp, vLLM, a hosted API) is a config
//! change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

pub use client::{InferenceClient, ModelInference};
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, InferenceOptions, Role};
