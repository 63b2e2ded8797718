//! Routing types: utterances, classifier judgments and routing decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::{is_reserved_agent_id, normalize_agent_id};

// ─── Utterance ───────────────────────────────────────────────────────────────

/// One user input. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// The conversation turn this utterance becomes when committed.
    pub turn_number: u64,
}

impl Utterance {
    pub fn new(text: impl Into<String>, turn_number: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            timestamp: Utc::now(),
            turn_number,
        }
    }

    /// Empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ─── Judgment ────────────────────────────────────────────────────────────────

/// The agent the classifier proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Candidate {
    Agent(String),
    /// The model declined to pick an agent, or its output was unusable.
    None,
}

impl Candidate {
    /// Normalize a raw agent label from model output.
    ///
    /// Labels get the same normalization as registered ids, so model output
    /// in any case resolves to the agent. Decline labels map to `None`.
    pub fn from_label(raw: &str) -> Self {
        let label = normalize_agent_id(raw.trim().trim_matches(|c: char| c == '"' || c == '\''));
        if label.is_empty() || is_reserved_agent_id(&label) {
            Candidate::None
        } else {
            Candidate::Agent(label)
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Candidate::Agent(id) => Some(id),
            Candidate::None => None,
        }
    }
}

/// Which parse stage produced a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStage {
    /// Well-formed JSON object.
    Strict,
    /// Pattern extraction from free text.
    Lenient,
    /// Nothing usable in the output.
    Failed,
    /// No model call was made (blank utterance).
    Skipped,
    /// No model call was made: the utterance is over the length limit.
    Oversized,
}

/// The classifier's reading of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingJudgment {
    pub candidate: Candidate,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f32,
    pub rationale: String,
    /// The model output exactly as received.
    pub raw_output: String,
    pub stage: ParseStage,
    /// A clarified rewrite of the query, when the model offers one.
    pub reformulated_query: Option<String>,
}

impl RoutingJudgment {
    /// The judgment for output that neither parse stage could read.
    pub fn parse_failure(raw_output: impl Into<String>) -> Self {
        let raw_output = raw_output.into();
        Self {
            candidate: Candidate::None,
            confidence: 0.0,
            rationale: raw_output.clone(),
            raw_output,
            stage: ParseStage::Failed,
            reformulated_query: None,
        }
    }

    /// Distinguishes "the output was unreadable" from "the model said no".
    pub fn is_parse_failure(&self) -> bool {
        self.stage == ParseStage::Failed
    }
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// How sure the router was about a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFlag {
    Confident,
    LowConfidence,
    /// Routed to the configured default after a parse failure.
    Fallback,
}

/// What to do with an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Dispatch { agent_id: String, flag: ConfidenceFlag },
    FallbackDefault { agent_id: String },
    Clarify,
}

/// Why the engine decided what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    Confident,
    LowConfidence,
    BelowThreshold,
    UnknownOrDeadAgent,
    NoCandidate,
    ParseFailure,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::Confident => "confident",
            DecisionReason::LowConfidence => "low-confidence",
            DecisionReason::BelowThreshold => "below-threshold",
            DecisionReason::UnknownOrDeadAgent => "unknown-or-dead-agent",
            DecisionReason::NoCandidate => "no-candidate",
            DecisionReason::ParseFailure => "parse-failure",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision per utterance. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub outcome: DecisionOutcome,
    pub judgment: RoutingJudgment,
    pub reason: DecisionReason,
}

impl RoutingDecision {
    /// The agent to invoke, if any.
    pub fn target_agent(&self) -> Option<&str> {
        match &self.outcome {
            DecisionOutcome::Dispatch { agent_id, .. }
            | DecisionOutcome::FallbackDefault { agent_id } => Some(agent_id),
            DecisionOutcome::Clarify => None,
        }
    }

    pub fn confidence_flag(&self) -> Option<ConfidenceFlag> {
        match &self.outcome {
            DecisionOutcome::Dispatch { flag, .. } => Some(*flag),
            DecisionOutcome::FallbackDefault { .. } => Some(ConfidenceFlag::Fallback),
            DecisionOutcome::Clarify => None,
        }
    }

    pub fn needs_clarification(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::Clarify)
    }
}
