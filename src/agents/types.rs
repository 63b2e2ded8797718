//! Agent descriptors and the invocation contract.
//!
//! Agents are external: the router only knows what each one claims it can
//! do ([`AgentDescriptor`]) and how to call it ([`super::AgentInvoker`]).
//! Every invocation receives the utterance plus a read-only context
//! snapshot and answers with an [`AgentOutcome`] or an [`AgentFailure`].

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextSnapshot, EntityMap, TaskUpdate};
use crate::routing::Utterance;

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// Labels the classifier uses to decline routing. No agent may take one.
pub const RESERVED_AGENT_IDS: &[&str] = &["none", "router", "clarify", "null", "unknown"];

/// Canonical form of an agent id: trimmed and lowercased.
pub fn normalize_agent_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Whether a canonical id is one of [`RESERVED_AGENT_IDS`].
pub fn is_reserved_agent_id(id: &str) -> bool {
    RESERVED_AGENT_IDS.contains(&id)
}

/// What the registry knows about an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique id (e.g. `"search"`). The registry stores it normalized.
    pub id: String,
    pub description: String,
    /// Capability tags, kept sorted for stable prompts.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Dead agents stay registered but are never dispatched to.
    #[serde(default = "default_live")]
    pub live: bool,
}

fn default_live() -> bool {
    true
}

impl AgentDescriptor {
    pub fn new<I, S>(id: impl Into<String>, description: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            description: description.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            live: true,
        }
    }

    pub fn with_liveness(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }
}

// ─── Invocation ──────────────────────────────────────────────────────────────

/// Everything an agent receives for one dispatch.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub session_id: String,
    pub utterance: Utterance,
    /// The classifier's reformulation when it offered one, else the raw text.
    pub query: String,
    /// Read-only view of the session at dispatch time.
    pub context: ContextSnapshot,
}

/// Per-call options. `attempt` starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationOptions {
    pub timeout: Duration,
    pub attempt: u32,
}

/// A successful agent result, merged into the context by the coordinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutcome {
    pub result_text: String,
    pub updated_entities: EntityMap,
    pub task_update: Option<TaskUpdate>,
}

impl AgentOutcome {
    pub fn text(result_text: impl Into<String>) -> Self {
        Self {
            result_text: result_text.into(),
            ..Self::default()
        }
    }

    pub fn with_entities(mut self, entities: EntityMap) -> Self {
        self.updated_entities.extend(entities);
        self
    }

    pub fn with_task(mut self, update: TaskUpdate) -> Self {
        self.task_update = Some(update);
        self
    }
}

/// An agent-side failure.
///
/// `retryable` is the agent's own statement; the coordinator never guesses.
/// Non-retryable failures are domain errors and reach the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AgentFailure {
    pub message: String,
    pub retryable: bool,
}

impl AgentFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
