//! Agent registry error types.

use thiserror::Error;

/// Errors raised by [`super::AgentRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An agent with this id is already registered.
    #[error("agent already registered: {id}")]
    DuplicateAgent { id: String },

    /// The id is empty, or collides with a label the classifier uses to
    /// decline routing.
    #[error("agent id '{id}' is empty or reserved")]
    InvalidAgentId { id: String },

    /// No agent with this id is registered.
    #[error("unknown agent: {id}")]
    UnknownAgent { id: String },
}
