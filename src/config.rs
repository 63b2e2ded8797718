//! Configuration loading and validation.
//!
//! Reads `switchboard.yaml` and resolves environment variables. Every field
//! has a default, so an empty file (or no file) yields a working local setup:
//! an Ollama endpoint, the four built-in agents and in-memory contexts.
//!
//! ```yaml
//! model:
//!   base_url: ${SWITCHBOARD_MODEL_URL:-http://localhost:11434/v1}
//!   model_name: qwen2.5:7b-instruct
//! routing:
//!   low_threshold: 0.4
//!   high_threshold: 0.75
//!   fallback_agent: search
//!   max_utterance_chars: 32000
//! retry:
//!   classifier: { max_attempts: 3, initial_delay_ms: 250 }
//!   agent: { max_attempts: 3 }
//! agent_timeout_ms: 20000
//! persistence:
//!   db_path: ~/.switchboard/contexts.db
//! logging:
//!   dir: ~/.switchboard/logs
//!   keep: 3
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::agents::{catalog, is_reserved_agent_id, normalize_agent_id, AgentDescriptor};
use crate::dispatch::RetryPolicy;
use crate::inference::ModelConfig;
use crate::routing::{DecisionPolicy, PromptSettings, RoutingError};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Config file name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "switchboard.yaml";

/// Env var pointing directly at a config file.
pub const CONFIG_ENV_VAR: &str = "SWITCHBOARD_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {reason}")]
    NotFound { reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

impl From<RoutingError> for ConfigError {
    fn from(e: RoutingError) -> Self {
        ConfigError::Invalid {
            reason: e.to_string(),
        }
    }
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `switchboard.yaml`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub model: ModelConfig,
    pub routing: RoutingConfig,
    pub retry: RetryConfig,
    /// Per-call agent timeout in milliseconds.
    pub agent_timeout_ms: u64,
    /// Agents to register at startup. Empty means the built-in catalog.
    pub agents: Vec<AgentDescriptor>,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Thresholds, fallback and classifier context window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Agent used when classifier output can't be parsed. Unset means clarify.
    pub fallback_agent: Option<String>,
    /// Recent turns shown to the classifier.
    pub history_turns: usize,
    /// Per-turn byte limit in the classifier prompt.
    pub max_turn_chars: usize,
    /// Utterances longer than this many characters are not routed.
    pub max_utterance_chars: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let prompt = PromptSettings::default();
        Self {
            low_threshold: crate::routing::engine::DEFAULT_LOW_THRESHOLD,
            high_threshold: crate::routing::engine::DEFAULT_HIGH_THRESHOLD,
            fallback_agent: None,
            history_turns: prompt.history_turns,
            max_turn_chars: prompt.max_turn_chars,
            max_utterance_chars: prompt.max_utterance_chars,
        }
    }
}

impl RoutingConfig {
    pub fn policy(&self) -> Result<DecisionPolicy, RoutingError> {
        DecisionPolicy::new(
            self.low_threshold,
            self.high_threshold,
            self.fallback_agent.clone(),
        )
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            history_turns: self.history_turns,
            max_turn_chars: self.max_turn_chars,
            max_utterance_chars: self.max_utterance_chars,
        }
    }
}

/// Retry budgets for the two external capabilities.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub classifier: RetryPolicy,
    pub agent: RetryPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// SQLite file for session contexts. Unset keeps contexts in memory only.
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the log file. Unset logs to stderr.
    pub dir: Option<PathBuf>,
    /// Log file name inside `dir`.
    pub file_name: String,
    /// Rotated logs kept next to the current one.
    pub keep: u32,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: "switchboard.log".to_string(),
            keep: 3,
            filter: None,
        }
    }
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            routing: RoutingConfig::default(),
            retry: RetryConfig::default(),
            agent_timeout_ms: 30_000,
            agents: Vec::new(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SwitchboardConfig {
    /// Parse a YAML document, interpolating `${VAR}` and `${VAR:-default}`.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        // An empty document deserializes to unit, not to an empty mapping.
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: SwitchboardConfig =
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?;
        config.persistence.db_path = config.persistence.db_path.map(|p| expand_tilde(&p));
        config.logging.dir = config
            .logging
            .dir
            .map(|d| PathBuf::from(expand_tilde(&d.to_string_lossy())));
        Ok(config)
    }

    /// Reject settings that would make routing misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.policy()?;

        if self.routing.max_utterance_chars == 0 {
            return Err(ConfigError::Invalid {
                reason: "routing.max_utterance_chars must be at least 1".into(),
            });
        }

        let file_name = Path::new(&self.logging.file_name);
        if file_name.file_name() != Some(file_name.as_os_str()) {
            return Err(ConfigError::Invalid {
                reason: format!("logging.file_name '{}' must be a plain file name", self.logging.file_name),
            });
        }

        if self.retry.classifier.max_attempts == 0 || self.retry.agent.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry max_attempts must be at least 1".into(),
            });
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            let id = normalize_agent_id(&agent.id);
            if id.is_empty() || is_reserved_agent_id(&id) {
                return Err(ConfigError::Invalid {
                    reason: format!("agent id '{}' is empty or reserved", agent.id),
                });
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate agent id '{}'", agent.id),
                });
            }
        }
        Ok(())
    }

    /// Configured agents, or the built-in catalog when none are listed.
    pub fn agent_descriptors(&self) -> Vec<AgentDescriptor> {
        if self.agents.is_empty() {
            catalog::default_agents()
        } else {
            self.agents.clone()
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `SWITCHBOARD_CONFIG` first, then searches upward from `start` for
/// `switchboard.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points to a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        reason: format!("no {CONFIG_FILE_NAME} above {}", start.display()),
    })
}

/// Load, interpolate and validate a config file.
pub fn load_config(path: &Path) -> Result<SwitchboardConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let config = SwitchboardConfig::from_yaml_str(&raw)?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset or empty variables take the default.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
