//! Dispatch coordinator.
//!
//! Drives each utterance through classify → decide → invoke → merge:
//!
//! - Classification failures are retried with bounded exponential backoff;
//!   only transient inference errors are retried
//! - Agent failures are retried only when the agent marks them retryable;
//!   timeouts count as retryable. Non-retryable failures are domain errors
//!   and reach the user verbatim
//! - A turn's context changes land in one atomic commit, so a cancelled or
//!   failed turn never leaves a partial write behind
//! - Turns of one session are serialized in arrival order; sessions run in
//!   parallel
//!
//! Every turn runs inside a `turn` tracing span carrying the session id and
//! turn number.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agents::{
    normalize_agent_id, AgentDescriptor, AgentFailure, AgentInvoker, AgentOutcome, AgentRegistry,
    AgentRequest, InvocationOptions, RegistryError, RegistrySnapshot,
};
use crate::config::SwitchboardConfig;
use crate::context::{
    ContextError, ContextPersistence, ContextSnapshot, ContextUpdate, NewTurn, SqlitePersistence,
    TaskUpdate,
};
use crate::inference::{InferenceError, ModelInference};
use crate::routing::{
    decide, DecisionPolicy, DecisionReason, IntentClassifier, ParseStage, RoutingDecision,
    RoutingJudgment, Utterance,
};
use crate::routing::prompt::truncate_chars;

use super::errors::DispatchError;
use super::retry::RetryPolicy;
use super::session::{Session, SessionTable};
use super::types::{TurnResponse, TurnState, TurnTrace};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Timeouts and retry budgets for the external calls.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub classifier_retry: RetryPolicy,
    pub agent_retry: RetryPolicy,
    pub agent_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            classifier_retry: RetryPolicy::default(),
            agent_retry: RetryPolicy::default(),
            agent_timeout: Duration::from_secs(30),
        }
    }
}

/// How an agent invocation ended after retries.
enum InvocationResult {
    Completed(AgentOutcome),
    DomainError(AgentFailure),
    Unavailable(String),
}

// ─── DispatchCoordinator ─────────────────────────────────────────────────────

/// Routes utterances to agents and keeps each session's context consistent.
pub struct DispatchCoordinator {
    registry: Arc<AgentRegistry>,
    invokers: RwLock<HashMap<String, Arc<dyn AgentInvoker>>>,
    classifier: IntentClassifier,
    policy: DecisionPolicy,
    settings: DispatchSettings,
    sessions: SessionTable,
    persistence: Option<Arc<dyn ContextPersistence>>,
}

impl DispatchCoordinator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        classifier: IntentClassifier,
        policy: DecisionPolicy,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            invokers: RwLock::new(HashMap::new()),
            classifier,
            policy,
            settings,
            sessions: SessionTable::default(),
            persistence: None,
        }
    }

    /// Attach a persistence collaborator. Sessions opened afterwards are
    /// restored from it, and every finished turn is saved to it.
    pub fn with_persistence(mut self, persistence: Arc<dyn ContextPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Build a coordinator from configuration.
    ///
    /// Registers the configured (or built-in) agents without invokers; bind
    /// one per agent with [`Self::bind_invoker`] before routing to it.
    pub fn from_config(
        config: &SwitchboardConfig,
        inference: Arc<dyn ModelInference>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;

        let registry = Arc::new(AgentRegistry::with_agents(config.agent_descriptors())?);
        let classifier = IntentClassifier::new(
            inference,
            config.model.inference_options(),
            config.routing.prompt_settings(),
        );
        let settings = DispatchSettings {
            classifier_retry: config.retry.classifier.clone(),
            agent_retry: config.retry.agent.clone(),
            agent_timeout: Duration::from_millis(config.agent_timeout_ms),
        };
        let coordinator = Self::new(registry, classifier, config.routing.policy()?, settings);

        match &config.persistence.db_path {
            Some(path) => {
                let db = SqlitePersistence::open(path)
                    .map_err(|source| DispatchError::Storage { source })?;
                tracing::info!(path = %path, "context persistence enabled");
                Ok(coordinator.with_persistence(Arc::new(db)))
            }
            None => Ok(coordinator),
        }
    }

    // ─── Agents ──────────────────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Register an agent together with the invoker that reaches it.
    pub fn register_agent(
        &self,
        descriptor: AgentDescriptor,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Result<(), RegistryError> {
        let id = normalize_agent_id(&descriptor.id);
        self.registry.register(descriptor)?;
        self.write_invokers().insert(id, invoker);
        Ok(())
    }

    /// Attach an invoker to an already registered agent, replacing any
    /// previous one.
    pub fn bind_invoker(
        &self,
        agent_id: &str,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Result<(), RegistryError> {
        let id = self.registry.find(agent_id)?.id;
        self.write_invokers().insert(id, invoker);
        Ok(())
    }

    /// Remove an agent and its invoker. Idempotent.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        self.write_invokers().remove(&normalize_agent_id(agent_id));
        self.registry.unregister(agent_id)
    }

    // ─── Sessions ────────────────────────────────────────────────────────

    /// The last committed context of a session, if the session is open.
    pub fn context(&self, session_id: &str) -> Option<ContextSnapshot> {
        self.sessions.get(session_id).map(|s| s.store.snapshot())
    }

    /// Ids of sessions opened by this coordinator.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.ids()
    }

    // ─── Turns ───────────────────────────────────────────────────────────

    /// Route one utterance.
    pub async fn submit(
        &self,
        session_id: &str,
        text: impl Into<String>,
    ) -> Result<TurnResponse, DispatchError> {
        self.submit_with_cancel(session_id, text, CancellationToken::new())
            .await
    }

    /// Route one utterance, abandoning it if `cancel` fires first.
    ///
    /// A cancelled turn drops its in-flight inference or agent call and
    /// leaves the context at its last committed state.
    pub async fn submit_with_cancel(
        &self,
        session_id: &str,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TurnResponse, DispatchError> {
        let text = text.into();
        let session = self.sessions.open(session_id, self.persistence.as_deref());

        let _turn_guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(session_id, "turn cancelled while queued");
                return Err(DispatchError::Cancelled { session_id: session_id.to_string() });
            }
            guard = session.gate.lock() => guard,
        };

        let snapshot = session.store.snapshot();
        let utterance = Utterance::new(text, snapshot.last_turn_number() + 1);
        let span = tracing::info_span!("turn", session_id, turn = utterance.turn_number);

        let run = self
            .run_turn(session_id, &session, utterance, snapshot)
            .instrument(span.clone());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                span.in_scope(|| tracing::warn!("turn cancelled, context left at last commit"));
                Err(DispatchError::Cancelled { session_id: session_id.to_string() })
            }
            result = run => result,
        }
    }

    async fn run_turn(
        &self,
        session_id: &str,
        session: &Session,
        utterance: Utterance,
        snapshot: ContextSnapshot,
    ) -> Result<TurnResponse, DispatchError> {
        let mut trace = TurnTrace::new();
        tracing::info!(utterance_id = %utterance.id, "turn received");

        // ── Classifying ──
        trace.advance(TurnState::Classifying);
        let agents = self.registry.snapshot();
        let judgment = match self.classify_with_retry(&utterance, &snapshot, &agents).await {
            Ok(judgment) => judgment,
            Err(e) => {
                trace.advance(TurnState::Failed);
                let text = degraded_response("the routing model");
                return Ok(self.finish_unavailable(session_id, session, utterance, trace, None, text, &e.to_string()));
            }
        };

        // ── Deciding ──
        trace.advance(TurnState::Deciding);
        let decision = decide(judgment, &agents, &self.policy);
        tracing::info!(
            outcome = ?decision.outcome,
            reason = %decision.reason,
            confidence = decision.judgment.confidence,
            "routing decided"
        );

        let Some(agent_id) = decision.target_agent().map(str::to_string) else {
            let text = clarification_prompt(&decision);
            let receipt = self.commit(
                session_id,
                session,
                &utterance,
                ContextUpdate::default()
                    .with_turn(self.user_turn(&utterance))
                    .with_turn(NewTurn::system(&text)),
            )?;
            trace.advance(TurnState::Done);
            return Ok(TurnResponse {
                session_id: session_id.to_string(),
                utterance_id: utterance.id,
                turn_number: utterance.turn_number,
                state: trace.current(),
                response_text: text,
                chosen_agent_id: None,
                confidence_flag: None,
                clarification_needed: true,
                domain_error: None,
                decision: Some(decision),
                trace: trace.into_states(),
                context_version: receipt,
            });
        };

        // ── Invoking ──
        trace.advance(TurnState::Invoking);
        let request = AgentRequest {
            session_id: session_id.to_string(),
            query: decision
                .judgment
                .reformulated_query
                .clone()
                .unwrap_or_else(|| utterance.text.clone()),
            utterance: utterance.clone(),
            context: Arc::clone(&snapshot),
        };

        let (response_text, domain_error, update) = match self.invoke_with_retry(&agent_id, &request).await {
            InvocationResult::Completed(outcome) => {
                let update = ContextUpdate::default()
                    .with_turn(self.user_turn(&utterance))
                    .with_turn(NewTurn::agent(&agent_id, &outcome.result_text))
                    .with_entities(outcome.updated_entities)
                    .with_task(outcome.task_update);
                (outcome.result_text, None, update)
            }
            InvocationResult::DomainError(failure) => {
                tracing::info!(agent = %agent_id, error = %failure, "agent reported a domain error");
                let update = ContextUpdate::default()
                    .with_turn(self.user_turn(&utterance))
                    .with_turn(NewTurn::agent(&agent_id, &failure.message));
                (failure.message.clone(), Some(failure.message), update)
            }
            InvocationResult::Unavailable(reason) => {
                trace.advance(TurnState::Failed);
                let text = degraded_response(&format!("the {agent_id} agent"));
                return Ok(self.finish_unavailable(
                    session_id,
                    session,
                    utterance,
                    trace,
                    Some(decision),
                    text,
                    &reason,
                ));
            }
        };

        // ── Merging ──
        trace.advance(TurnState::Merging);
        let committed = assign_task_owner(update, &agent_id, &agents)
            .map_err(|source| DispatchError::Merge {
                session_id: session_id.to_string(),
                turn_number: utterance.turn_number,
                source,
            })
            .and_then(|update| self.commit(session_id, session, &utterance, update));
        let version = match committed {
            Ok(version) => version,
            Err(e) => {
                trace.advance(TurnState::Failed);
                tracing::warn!(state = ?trace.current(), error = %e, "turn failed during merge");
                return Err(e);
            }
        };
        trace.advance(TurnState::Done);
        tracing::info!(agent = %agent_id, version, "turn done");

        Ok(TurnResponse {
            session_id: session_id.to_string(),
            utterance_id: utterance.id,
            turn_number: utterance.turn_number,
            state: trace.current(),
            response_text,
            chosen_agent_id: Some(agent_id),
            confidence_flag: decision.confidence_flag(),
            clarification_needed: false,
            domain_error,
            decision: Some(decision),
            trace: trace.into_states(),
            context_version: version,
        })
    }

    // ─── Capability Calls ────────────────────────────────────────────────

    async fn classify_with_retry(
        &self,
        utterance: &Utterance,
        snapshot: &ContextSnapshot,
        agents: &RegistrySnapshot,
    ) -> Result<RoutingJudgment, InferenceError> {
        let policy = &self.settings.classifier_retry;
        let mut attempt = 1;
        loop {
            match self.classifier.classify(utterance, snapshot, agents).await {
                Ok(judgment) => return Ok(judgment),
                Err(e) if e.is_retriable() && attempt < policy.attempts() => {
                    let delay = policy.delay_before(attempt + 1);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "classification failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "classification unavailable");
                    return Err(e);
                }
            }
        }
    }

    async fn invoke_with_retry(&self, agent_id: &str, request: &AgentRequest) -> InvocationResult {
        let invoker = self
            .invokers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned();
        let Some(invoker) = invoker else {
            tracing::warn!(agent = %agent_id, "no invoker bound for agent");
            return InvocationResult::Unavailable(format!("no invoker bound for agent '{agent_id}'"));
        };

        let policy = &self.settings.agent_retry;
        let timeout = self.settings.agent_timeout;
        let mut last_error = String::new();

        for attempt in 1..=policy.attempts() {
            if attempt > 1 {
                tokio::time::sleep(policy.delay_before(attempt)).await;
            }
            let options = InvocationOptions { timeout, attempt };

            match tokio::time::timeout(timeout, invoker.invoke(request, &options)).await {
                Ok(Ok(outcome)) => {
                    tracing::info!(agent = %agent_id, attempt, "agent responded");
                    return InvocationResult::Completed(outcome);
                }
                Ok(Err(failure)) if !failure.retryable => {
                    return InvocationResult::DomainError(failure);
                }
                Ok(Err(failure)) => {
                    tracing::warn!(agent = %agent_id, attempt, error = %failure, "agent call failed");
                    last_error = failure.message;
                }
                Err(_) => {
                    tracing::warn!(
                        agent = %agent_id,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "agent call timed out"
                    );
                    last_error = format!("timed out after {}ms", timeout.as_millis());
                }
            }
        }

        InvocationResult::Unavailable(last_error)
    }

    // ─── Commit ──────────────────────────────────────────────────────────

    /// Apply a turn's changes atomically and persist the result.
    fn commit(
        &self,
        session_id: &str,
        session: &Session,
        utterance: &Utterance,
        update: ContextUpdate,
    ) -> Result<u64, DispatchError> {
        let receipt = session
            .store
            .apply(update)
            .map_err(|source| DispatchError::Merge {
                session_id: session_id.to_string(),
                turn_number: utterance.turn_number,
                source,
            })?;
        self.persist(session_id, session);
        Ok(receipt.version)
    }

    /// Save failures are logged; the turn itself already committed.
    fn persist(&self, session_id: &str, session: &Session) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.save(session_id, &session.store.snapshot()) {
            tracing::warn!(error = %e, "failed to persist session context");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_unavailable(
        &self,
        session_id: &str,
        session: &Session,
        utterance: Utterance,
        trace: TurnTrace,
        decision: Option<RoutingDecision>,
        text: String,
        reason: &str,
    ) -> TurnResponse {
        tracing::warn!(state = ?trace.current(), reason, "capability unavailable, turn failed");

        // Keep the exchange in history; there is no task update to reject.
        let update = ContextUpdate::default()
            .with_turn(self.user_turn(&utterance))
            .with_turn(NewTurn::system(&text));
        let version = match self.commit(session_id, session, &utterance, update) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "failed to record failed turn");
                session.store.version()
            }
        };

        TurnResponse {
            session_id: session_id.to_string(),
            utterance_id: utterance.id,
            turn_number: utterance.turn_number,
            state: trace.current(),
            response_text: text,
            chosen_agent_id: decision.as_ref().and_then(|d| d.target_agent()).map(str::to_string),
            confidence_flag: decision.as_ref().and_then(RoutingDecision::confidence_flag),
            clarification_needed: false,
            domain_error: None,
            decision,
            trace: trace.into_states(),
            context_version: version,
        }
    }

    /// The user's side of a turn. Over-long utterances are stored cut to
    /// the routing limit.
    fn user_turn(&self, utterance: &Utterance) -> NewTurn {
        let limit = self.classifier.prompt_settings().max_utterance_chars;
        NewTurn::user(truncate_chars(&utterance.text, limit))
    }

    fn write_invokers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn AgentInvoker>>> {
        self.invokers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Task Ownership ──────────────────────────────────────────────────────────

/// Give the task update an owner before it is committed.
///
/// An update without one is owned by the agent that produced it. A named
/// owner must be registered.
fn assign_task_owner(
    mut update: ContextUpdate,
    agent_id: &str,
    agents: &RegistrySnapshot,
) -> Result<ContextUpdate, ContextError> {
    let Some(task) = update.task.take() else {
        return Ok(update);
    };
    let owner = task.owner_agent.as_deref().unwrap_or(agent_id);
    let Some(descriptor) = agents.get(owner) else {
        return Err(ContextError::UnknownTaskOwner {
            task_id: task.task_id,
            agent_id: owner.to_string(),
        });
    };
    let owner = descriptor.id.clone();
    update.task = Some(TaskUpdate {
        owner_agent: Some(owner),
        ..task
    });
    Ok(update)
}

// ─── Response Text ───────────────────────────────────────────────────────────

fn clarification_prompt(decision: &RoutingDecision) -> String {
    match decision.judgment.stage {
        ParseStage::Skipped => return "What can I help you with?".to_string(),
        ParseStage::Oversized => {
            return "That message is too long for me to route. \
                    Could you shorten it or split it into smaller requests?"
                .to_string()
        }
        _ => {}
    }
    let prompt = match decision.reason {
        DecisionReason::UnknownOrDeadAgent => {
            "The assistant best suited for that isn't available right now. \
             Could you rephrase, or ask about something else?"
        }
        DecisionReason::ParseFailure => {
            "I couldn't work out how to handle that. Could you rephrase your request?"
        }
        DecisionReason::NoCandidate => {
            "I'm not sure which assistant can help with that. \
             Could you tell me a bit more about what you need?"
        }
        _ => "I'm not confident I understood. Could you clarify what you'd like me to do?",
    };
    prompt.to_string()
}

fn degraded_response(capability: &str) -> String {
    format!("Sorry, {capability} is unavailable right now. Please try again in a moment.")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
