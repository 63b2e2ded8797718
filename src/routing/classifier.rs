//! Intent classifier.
//!
//! One classification attempt: build the prompt, call the model under the
//! per-call timeout, parse whatever comes back. Retrying transient inference
//! failures is the dispatch coordinator's job.

use std::sync::Arc;

use crate::agents::RegistrySnapshot;
use crate::context::ConversationContext;
use crate::inference::{InferenceError, InferenceOptions, ModelInference};

use super::judgment_parser::parse_judgment;
use super::prompt::{build_classifier_prompt, PromptSettings};
use super::types::{Candidate, ParseStage, RoutingJudgment, Utterance};

/// Turns an utterance plus context into a [`RoutingJudgment`].
#[derive(Clone)]
pub struct IntentClassifier {
    inference: Arc<dyn ModelInference>,
    options: InferenceOptions,
    prompt: PromptSettings,
}

impl IntentClassifier {
    pub fn new(
        inference: Arc<dyn ModelInference>,
        options: InferenceOptions,
        prompt: PromptSettings,
    ) -> Self {
        Self {
            inference,
            options,
            prompt,
        }
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    pub fn prompt_settings(&self) -> &PromptSettings {
        &self.prompt
    }

    /// Classify one utterance.
    ///
    /// Blank and over-long utterances are judged without calling the model.
    /// Only inference failures are errors; unparseable output is a
    /// parse-failure judgment.
    pub async fn classify(
        &self,
        utterance: &Utterance,
        context: &ConversationContext,
        agents: &RegistrySnapshot,
    ) -> Result<RoutingJudgment, InferenceError> {
        if utterance.is_blank() {
            tracing::warn!(utterance_id = %utterance.id, "blank utterance, skipping classification");
            return Ok(RoutingJudgment {
                candidate: Candidate::None,
                confidence: 0.0,
                rationale: "empty utterance".to_string(),
                raw_output: String::new(),
                stage: ParseStage::Skipped,
                reformulated_query: None,
            });
        }

        let limit = self.prompt.max_utterance_chars;
        if utterance.text.chars().nth(limit).is_some() {
            tracing::warn!(
                utterance_id = %utterance.id,
                bytes = utterance.text.len(),
                limit,
                "utterance over length limit, skipping classification"
            );
            return Ok(RoutingJudgment {
                candidate: Candidate::None,
                confidence: 0.0,
                rationale: format!("utterance longer than {limit} characters"),
                raw_output: String::new(),
                stage: ParseStage::Oversized,
                reformulated_query: None,
            });
        }

        let messages = build_classifier_prompt(utterance, context, agents, &self.prompt);

        let raw = tokio::time::timeout(
            self.options.timeout,
            self.inference.infer(&messages, &self.options),
        )
        .await
        .map_err(|_| InferenceError::Timeout {
            duration_ms: self.options.timeout.as_millis() as u64,
        })??;

        let judgment = parse_judgment(&raw, &agents.ids());

        tracing::info!(
            utterance_id = %utterance.id,
            candidate = judgment.candidate.agent_id().unwrap_or("none"),
            confidence = judgment.confidence,
            stage = ?judgment.stage,
            "utterance classified"
        );

        Ok(judgment)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{catalog, AgentRegistry};
    use crate::test_support::ScriptedInference;
    use std::time::Duration;

    fn classifier(inference: Arc<ScriptedInference>) -> IntentClassifier {
        IntentClassifier::new(
            inference,
            InferenceOptions {
                timeout: Duration::from_millis(200),
                ..InferenceOptions::default()
            },
            PromptSettings::default(),
        )
    }

    fn agents() -> Arc<RegistrySnapshot> {
        AgentRegistry::with_agents(catalog::default_agents())
            .unwrap()
            .snapshot()
    }

    #[tokio::test]
    async fn test_classify_parses_model_reply() {
        let model = Arc::new(ScriptedInference::replies([
            r#"{"agent":"search","confidence":0.9,"reason":"weather"}"#,
        ]));
        let j = classifier(Arc::clone(&model))
            .classify(
                &Utterance::new("What's the weather in Paris?", 1),
                &ConversationContext::default(),
                &agents(),
            )
            .await
            .unwrap();
        assert_eq!(j.candidate, Candidate::Agent("search".into()));
        assert_eq!(model.calls(), 1);
        let prompt = model.last_prompt().unwrap();
        assert!(prompt[1].content.contains("What's the weather in Paris?"));
    }

    #[tokio::test]
    async fn test_blank_utterance_skips_model() {
        let model = Arc::new(ScriptedInference::replies(["unused"]));
        let j = classifier(Arc::clone(&model))
            .classify(&Utterance::new("   ", 1), &ConversationContext::default(), &agents())
            .await
            .unwrap();
        assert_eq!(j.stage, ParseStage::Skipped);
        assert_eq!(j.candidate, Candidate::None);
        assert!(!j.is_parse_failure());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_utterance_skips_model() {
        let model = Arc::new(ScriptedInference::replies(["unused"]));
        let classifier = IntentClassifier::new(
            Arc::clone(&model) as Arc<dyn ModelInference>,
            InferenceOptions::default(),
            PromptSettings {
                max_utterance_chars: 10,
                ..PromptSettings::default()
            },
        );
        let ctx = ConversationContext::default();

        let at_limit = classifier.classify(&Utterance::new("éééééééééé", 1), &ctx, &agents()).await;
        assert!(at_limit.is_ok());
        assert_eq!(model.calls(), 1);

        let j = classifier
            .classify(&Utterance::new("a".repeat(11), 1), &ctx, &agents())
            .await
            .unwrap();
        assert_eq!(j.stage, ParseStage::Oversized);
        assert_eq!(j.candidate, Candidate::None);
        assert!(!j.is_parse_failure());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_a_judgment_not_an_error() {
        let model = Arc::new(ScriptedInference::replies(["I like turtles"]));
        let j = classifier(model)
            .classify(&Utterance::new("hm", 1), &ConversationContext::default(), &agents())
            .await
            .unwrap();
        assert!(j.is_parse_failure());
        assert_eq!(j.rationale, "I like turtles");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_model_times_out() {
        let model = Arc::new(ScriptedInference::delayed(
            Duration::from_secs(5),
            r#"{"agent":"search"}"#,
        ));
        let err = classifier(model)
            .classify(&Utterance::new("hi", 1), &ConversationContext::default(), &agents())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout { duration_ms: 200 }));
    }

    #[tokio::test]
    async fn test_inference_error_propagates() {
        let model = Arc::new(ScriptedInference::script(vec![Err(InferenceError::HttpError {
            status: 401,
            body: "unauthorized".into(),
        })]));
        let err = classifier(model)
            .classify(&Utterance::new("hi", 1), &ConversationContext::default(), &agents())
            .await
            .unwrap_err();
        assert!(!err.is_retriable());
    }
}
