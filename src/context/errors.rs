//! Context store error types.

use thiserror::Error;

use super::types::TaskStatus;

/// Errors raised by the context store and its persistence layer.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A task-state update asked for a transition outside the allowed set.
    #[error("invalid task transition for '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// A task was introduced in a status it cannot start in.
    #[error("task '{task_id}' cannot be created as {status}")]
    InvalidInitialStatus { task_id: String, status: TaskStatus },

    /// A task update names an owner that is not a registered agent.
    #[error("task '{task_id}' owner '{agent_id}' is not a registered agent")]
    UnknownTaskOwner { task_id: String, agent_id: String },

    /// SQLite or other storage failure.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    /// Snapshot (de)serialization failure.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<rusqlite::Error> for ContextError {
    fn from(e: rusqlite::Error) -> Self {
        ContextError::Persistence {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(e: serde_json::Error) -> Self {
        ContextError::Serialization {
            reason: e.to_string(),
        }
    }
}
