//! Context: the shared, versioned conversation state of each session.
//!
//! - [`ContextStore`]: append-only turns, last-write-wins entities and
//!   transition-checked task states behind copy-on-write snapshots
//! - [`ContextPersistence`]: optional save/load collaborator, with a
//!   SQLite implementation

pub mod errors;
pub mod persistence;
pub mod store;
pub mod types;

pub use errors::ContextError;
pub use persistence::{ContextPersistence, SqlitePersistence};
pub use store::{CommitReceipt, ContextStore};
pub use types::{
    ContextSnapshot, ContextUpdate, ConversationContext, EntityMap, EntityMergeReport, NewTurn,
    Speaker, TaskState, TaskStatus, TaskUpdate, Turn,
};
