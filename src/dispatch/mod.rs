//! Dispatch: the per-utterance state machine.
//!
//! [`DispatchCoordinator`] owns the sessions and drives every turn through
//! classification, decision, invocation and merge. Capability calls are
//! bounded by timeouts and [`RetryPolicy`] backoff.

pub mod coordinator;
pub mod errors;
pub mod retry;
mod session;
pub mod types;

pub use coordinator::{DispatchCoordinator, DispatchSettings};
pub use errors::DispatchError;
pub use retry::RetryPolicy;
pub use types::{TurnResponse, TurnState};
