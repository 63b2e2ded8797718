//! The uniform call interface every agent sits behind.

use async_trait::async_trait;

use super::types::{AgentFailure, AgentOutcome, AgentRequest, InvocationOptions};

/// Calls one agent.
///
/// Implementations do the domain work (search, document lookup, data-store
/// queries); the coordinator only handles timeouts, retries and merging.
/// `options.timeout` is also enforced by the caller, so implementations may
/// treat it as advisory.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &AgentRequest,
        options: &InvocationOptions,
    ) -> Result<AgentOutcome, AgentFailure>;
}
