//! Routing decision engine.
//!
//! [`decide`] is a pure function of a judgment, a registry snapshot and the
//! policy. Rules apply in order, first match wins:
//!
//! 1. Parse failure: the fallback agent if one is configured and live,
//!    otherwise clarify
//! 2. No candidate, or a candidate that is unknown or dead: clarify
//! 3. Confidence below the low threshold: clarify
//! 4. Confidence below the high threshold: dispatch, flagged low-confidence
//! 5. Otherwise: dispatch, flagged confident

use crate::agents::RegistrySnapshot;

use super::errors::RoutingError;
use super::types::{
    Candidate, ConfidenceFlag, DecisionOutcome, DecisionReason, RoutingDecision, RoutingJudgment,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Below this, the router asks the user to clarify.
pub const DEFAULT_LOW_THRESHOLD: f32 = 0.4;

/// At or above this, a dispatch is flagged confident.
pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.75;

// ─── DecisionPolicy ──────────────────────────────────────────────────────────

/// Confidence thresholds and the parse-failure fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPolicy {
    low_threshold: f32,
    high_threshold: f32,
    fallback_agent: Option<String>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            fallback_agent: None,
        }
    }
}

impl DecisionPolicy {
    /// Build a policy. Requires `0 <= low <= high <= 1`.
    pub fn new(
        low_threshold: f32,
        high_threshold: f32,
        fallback_agent: Option<String>,
    ) -> Result<Self, RoutingError> {
        let valid = (0.0..=1.0).contains(&low_threshold)
            && (0.0..=1.0).contains(&high_threshold)
            && low_threshold <= high_threshold;
        if !valid {
            return Err(RoutingError::InvalidThresholds {
                low: low_threshold,
                high: high_threshold,
            });
        }
        Ok(Self {
            low_threshold,
            high_threshold,
            fallback_agent: fallback_agent.filter(|id| !id.is_empty()),
        })
    }

    pub fn low_threshold(&self) -> f32 {
        self.low_threshold
    }

    pub fn high_threshold(&self) -> f32 {
        self.high_threshold
    }

    pub fn fallback_agent(&self) -> Option<&str> {
        self.fallback_agent.as_deref()
    }
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// Turn a judgment into exactly one routing decision.
pub fn decide(
    judgment: RoutingJudgment,
    registry: &RegistrySnapshot,
    policy: &DecisionPolicy,
) -> RoutingDecision {
    let (outcome, reason) = evaluate(&judgment, registry, policy);
    RoutingDecision {
        outcome,
        judgment,
        reason,
    }
}

fn evaluate(
    judgment: &RoutingJudgment,
    registry: &RegistrySnapshot,
    policy: &DecisionPolicy,
) -> (DecisionOutcome, DecisionReason) {
    if judgment.is_parse_failure() {
        let outcome = match policy.fallback_agent().and_then(|id| live_id(registry, id)) {
            Some(agent_id) => DecisionOutcome::FallbackDefault { agent_id },
            None => DecisionOutcome::Clarify,
        };
        return (outcome, DecisionReason::ParseFailure);
    }

    let agent_id = match &judgment.candidate {
        Candidate::None => return (DecisionOutcome::Clarify, DecisionReason::NoCandidate),
        Candidate::Agent(id) => match live_id(registry, id) {
            Some(agent_id) => agent_id,
            None => return (DecisionOutcome::Clarify, DecisionReason::UnknownOrDeadAgent),
        },
    };

    if judgment.confidence < policy.low_threshold {
        return (DecisionOutcome::Clarify, DecisionReason::BelowThreshold);
    }

    if judgment.confidence < policy.high_threshold {
        return (
            DecisionOutcome::Dispatch {
                agent_id,
                flag: ConfidenceFlag::LowConfidence,
            },
            DecisionReason::LowConfidence,
        );
    }

    (
        DecisionOutcome::Dispatch {
            agent_id,
            flag: ConfidenceFlag::Confident,
        },
        DecisionReason::Confident,
    )
}

/// The registered id for `id`, if that agent is live.
fn live_id(registry: &RegistrySnapshot, id: &str) -> Option<String> {
    registry.get(id).filter(|d| d.live).map(|d| d.id.clone())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{catalog, AgentDescriptor, AgentRegistry};
    use crate::routing::types::ParseStage;
    use proptest::prelude::*;

    fn judgment(agent: &str, confidence: f32) -> RoutingJudgment {
        RoutingJudgment {
            candidate: Candidate::from_label(agent),
            confidence,
            rationale: "test".into(),
            raw_output: String::new(),
            stage: ParseStage::Strict,
            reformulated_query: None,
        }
    }

    fn registry_with_dead_data() -> AgentRegistry {
        let registry = AgentRegistry::with_agents(catalog::default_agents()).unwrap();
        registry.set_liveness(catalog::DATA, false).unwrap();
        registry
    }

    #[test]
    fn test_confident_dispatch() {
        let snap = registry_with_dead_data().snapshot();
        let d = decide(judgment("search", 0.9), &snap, &DecisionPolicy::default());
        assert_eq!(
            d.outcome,
            DecisionOutcome::Dispatch {
                agent_id: "search".into(),
                flag: ConfidenceFlag::Confident
            }
        );
        assert_eq!(d.reason, DecisionReason::Confident);
        assert_eq!(d.target_agent(), Some("search"));
    }

    #[test]
    fn test_band_boundaries() {
        let snap = registry_with_dead_data().snapshot();
        let policy = DecisionPolicy::default();

        let at_low = decide(judgment("search", 0.4), &snap, &policy);
        assert_eq!(at_low.confidence_flag(), Some(ConfidenceFlag::LowConfidence));

        let below_low = decide(judgment("search", 0.399), &snap, &policy);
        assert!(below_low.needs_clarification());
        assert_eq!(below_low.reason, DecisionReason::BelowThreshold);

        let at_high = decide(judgment("search", 0.75), &snap, &policy);
        assert_eq!(at_high.confidence_flag(), Some(ConfidenceFlag::Confident));
    }

    #[test]
    fn test_dead_agent_clarifies_before_threshold_check() {
        let snap = registry_with_dead_data().snapshot();
        let d = decide(judgment("data", 0.5), &snap, &DecisionPolicy::default());
        assert!(d.needs_clarification());
        assert_eq!(d.reason.as_str(), "unknown-or-dead-agent");
    }

    #[test]
    fn test_unknown_agent_clarifies() {
        let snap = registry_with_dead_data().snapshot();
        let d = decide(judgment("weather", 0.99), &snap, &DecisionPolicy::default());
        assert_eq!(d.reason, DecisionReason::UnknownOrDeadAgent);
    }

    #[test]
    fn test_declined_candidate_clarifies() {
        let snap = registry_with_dead_data().snapshot();
        let d = decide(judgment("none", 0.95), &snap, &DecisionPolicy::default());
        assert_eq!(d.reason, DecisionReason::NoCandidate);
    }

    #[test]
    fn test_parse_failure_with_fallback() {
        let snap = registry_with_dead_data().snapshot();
        let policy = DecisionPolicy::new(0.4, 0.75, Some("search".into())).unwrap();
        let d = decide(RoutingJudgment::parse_failure("???"), &snap, &policy);
        assert_eq!(
            d.outcome,
            DecisionOutcome::FallbackDefault {
                agent_id: "search".into()
            }
        );
        assert_eq!(d.confidence_flag(), Some(ConfidenceFlag::Fallback));
    }

    #[test]
    fn test_parse_failure_without_usable_fallback_clarifies() {
        let snap = registry_with_dead_data().snapshot();
        let none = decide(RoutingJudgment::parse_failure("???"), &snap, &DecisionPolicy::default());
        assert!(none.needs_clarification());
        assert_eq!(none.reason, DecisionReason::ParseFailure);

        let dead_fallback = DecisionPolicy::new(0.4, 0.75, Some("data".into())).unwrap();
        let d = decide(RoutingJudgment::parse_failure("???"), &snap, &dead_fallback);
        assert!(d.needs_clarification());
    }

    #[test]
    fn test_mixed_case_ids_resolve_to_registered_id() {
        let snap = AgentRegistry::with_agents([AgentDescriptor::new("WebSearch", "web", ["news"])])
            .unwrap()
            .snapshot();

        let d = decide(judgment("WebSearch", 0.95), &snap, &DecisionPolicy::default());
        assert_eq!(d.target_agent(), Some("websearch"));
        assert_eq!(d.confidence_flag(), Some(ConfidenceFlag::Confident));

        let policy = DecisionPolicy::new(0.4, 0.75, Some("WEBSEARCH".into())).unwrap();
        let fallback = decide(RoutingJudgment::parse_failure("???"), &snap, &policy);
        assert_eq!(
            fallback.outcome,
            DecisionOutcome::FallbackDefault {
                agent_id: "websearch".into()
            }
        );
    }

    #[test]
    fn test_policy_rejects_bad_thresholds() {
        assert!(DecisionPolicy::new(0.8, 0.5, None).is_err());
        assert!(DecisionPolicy::new(-0.1, 0.5, None).is_err());
        assert!(DecisionPolicy::new(0.4, 1.2, None).is_err());
        assert!(DecisionPolicy::new(0.5, 0.5, None).is_ok());
        assert_eq!(DecisionPolicy::new(0.4, 0.75, Some(String::new())).unwrap().fallback_agent(), None);
    }

    fn any_agent() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["search", "desktop", "data", "ghost", "none"]).prop_map(String::from)
    }

    proptest! {
        #[test]
        fn prop_decide_is_deterministic(agent in any_agent(), confidence in 0.0f32..=1.0) {
            let snap = registry_with_dead_data().snapshot();
            let policy = DecisionPolicy::default();
            let first = decide(judgment(&agent, confidence), &snap, &policy);
            let second = decide(judgment(&agent, confidence), &snap, &policy);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_below_low_threshold_always_clarifies(agent in any_agent(), confidence in 0.0f32..0.4) {
            let snap = registry_with_dead_data().snapshot();
            let d = decide(judgment(&agent, confidence), &snap, &DecisionPolicy::default());
            prop_assert!(d.needs_clarification());
        }

        #[test]
        fn prop_high_confidence_live_agent_dispatches_confident(
            agent in prop::sample::select(vec!["search", "desktop", "documentation"]),
            shout in any::<bool>(),
            confidence in 0.75f32..=1.0,
        ) {
            let snap = registry_with_dead_data().snapshot();
            let label = if shout { agent.to_uppercase() } else { agent.to_string() };
            let d = decide(judgment(&label, confidence), &snap, &DecisionPolicy::default());
            prop_assert_eq!(
                d.outcome,
                DecisionOutcome::Dispatch { agent_id: agent.to_string(), flag: ConfidenceFlag::Confident }
            );
        }
    }
}
