//! Routing: from an utterance to exactly one routing decision.
//!
//! - [`IntentClassifier`]: prompt → model → [`RoutingJudgment`]
//! - [`judgment_parser`]: strict JSON, lenient extraction, explicit failure
//! - [`engine::decide`]: thresholds and fallback policy, pure

pub mod classifier;
pub mod engine;
pub mod errors;
pub mod judgment_parser;
pub mod prompt;
pub mod types;

pub use classifier::IntentClassifier;
pub use engine::{decide, DecisionPolicy};
pub use errors::RoutingError;
pub use prompt::PromptSettings;
pub use types::{
    Candidate, ConfidenceFlag, DecisionOutcome, DecisionReason, ParseStage, RoutingDecision,
    RoutingJudgment, Utterance,
};
