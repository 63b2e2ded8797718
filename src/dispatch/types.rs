//! Turn lifecycle and the response handed back to the session.

use serde::Serialize;
use uuid::Uuid;

use crate::routing::{ConfidenceFlag, RoutingDecision};

// ─── TurnState ───────────────────────────────────────────────────────────────

/// Lifecycle of one utterance through the coordinator.
///
/// ```text
/// Received → Classifying → Deciding → Invoking → Merging → Done
///                              └──────── Done (clarify)
/// any non-terminal state → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    Classifying,
    Deciding,
    Invoking,
    Merging,
    Done,
    Failed,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Done | TurnState::Failed)
    }

    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Received, Classifying)
            | (Classifying, Deciding)
            | (Deciding, Invoking)
            | (Deciding, Done)
            | (Invoking, Merging)
            | (Merging, Done) => true,
            _ => false,
        }
    }
}

/// The states a turn has passed through, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TurnTrace {
    states: Vec<TurnState>,
}

impl TurnTrace {
    pub(crate) fn new() -> Self {
        Self {
            states: vec![TurnState::Received],
        }
    }

    pub(crate) fn current(&self) -> TurnState {
        self.states.last().copied().unwrap_or(TurnState::Received)
    }

    pub(crate) fn advance(&mut self, next: TurnState) {
        let from = self.current();
        debug_assert!(from.can_transition_to(next), "illegal turn transition {from:?} -> {next:?}");
        tracing::debug!(from = ?from, to = ?next, "turn state");
        self.states.push(next);
    }

    pub(crate) fn into_states(self) -> Vec<TurnState> {
        self.states
    }
}

// ─── TurnResponse ────────────────────────────────────────────────────────────

/// What the session receives for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub utterance_id: Uuid,
    /// Turn number of the user's utterance.
    pub turn_number: u64,
    /// `Done` or `Failed`.
    pub state: TurnState,
    /// Agent result, clarification prompt, domain error or degraded message.
    pub response_text: String,
    pub chosen_agent_id: Option<String>,
    pub confidence_flag: Option<ConfidenceFlag>,
    pub clarification_needed: bool,
    /// Set when the agent reported a non-retryable failure.
    pub domain_error: Option<String>,
    /// `None` when the turn failed before a decision was made.
    pub decision: Option<RoutingDecision>,
    pub trace: Vec<TurnState>,
    /// Context version after this turn's commit.
    pub context_version: u64,
}
