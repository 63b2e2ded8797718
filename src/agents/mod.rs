//! Agents: the capability registry and the invocation seam.
//!
//! - [`AgentRegistry`]: registered agents, capability lookup, liveness
//! - [`AgentInvoker`]: async trait each external agent is reached through
//! - [`catalog`]: the default documentation/search/desktop/data set

pub mod catalog;
pub mod errors;
pub mod invoker;
pub mod registry;
pub mod types;

pub use errors::RegistryError;
pub use invoker::AgentInvoker;
pub use registry::{AgentRegistry, CapabilityMatches, RegistrySnapshot};
pub use types::{
    is_reserved_agent_id, normalize_agent_id, AgentDescriptor, AgentFailure, AgentOutcome,
    AgentRequest, InvocationOptions, RESERVED_AGENT_IDS,
};
