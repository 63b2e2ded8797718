//! Dispatch error types.
//!
//! Most turn outcomes are not errors: clarifications, domain errors and even
//! exhausted capabilities come back as a [`super::TurnResponse`]. Errors are
//! reserved for turns whose result could not be committed and for setup.

use thiserror::Error;

use crate::agents::RegistryError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::routing::RoutingError;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The agent's result could not be merged; the turn ended `Failed` and
    /// the context kept its pre-merge state.
    #[error("turn {turn_number} of session '{session_id}' failed to merge: {source}")]
    Merge {
        session_id: String,
        turn_number: u64,
        #[source]
        source: ContextError,
    },

    /// The caller cancelled the turn before it committed.
    #[error("turn cancelled in session '{session_id}'")]
    Cancelled { session_id: String },

    /// Opening the persistence layer failed.
    #[error("persistence setup failed: {source}")]
    Storage {
        #[source]
        source: ContextError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
