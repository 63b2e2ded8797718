//! Scripted fakes for the model and agent seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{AgentFailure, AgentInvoker, AgentOutcome, AgentRequest, InvocationOptions};
use crate::inference::{ChatMessage, InferenceError, InferenceOptions, ModelInference};

// ─── ScriptedInference ───────────────────────────────────────────────────────

/// Model fake that answers from a script, then from a standing reply if one
/// was given.
pub(crate) struct ScriptedInference {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    standing: Option<String>,
    delay: Duration,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedInference {
    pub(crate) fn script(steps: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            standing: None,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::script(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// Same reply on every call.
    pub(crate) fn always(reply: impl Into<String>) -> Self {
        Self {
            standing: Some(reply.into()),
            ..Self::script(Vec::new())
        }
    }

    pub(crate) fn delayed(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            ..Self::always(reply)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelInference for ScriptedInference {
    async fn infer(
        &self,
        messages: &[ChatMessage],
        _options: &InferenceOptions,
    ) -> Result<String, InferenceError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.standing) {
            (Some(step), _) => step,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(InferenceError::MalformedResponse {
                reason: "script exhausted".into(),
            }),
        }
    }
}

// ─── Agents ──────────────────────────────────────────────────────────────────

pub(crate) enum AgentStep {
    Reply(AgentOutcome),
    Fail(AgentFailure),
    /// Never answers; only a timeout or cancellation ends the call.
    Hang,
}

/// Agent fake that plays queued steps, then answers with a canned text.
pub(crate) struct ScriptedAgent {
    id: String,
    steps: Mutex<VecDeque<AgentStep>>,
    requests: Mutex<Vec<(AgentRequest, InvocationOptions)>>,
}

impl ScriptedAgent {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, step: AgentStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<AgentRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub(crate) fn attempts_seen(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, options)| options.attempt)
            .collect()
    }
}

#[async_trait]
impl AgentInvoker for ScriptedAgent {
    async fn invoke(
        &self,
        request: &AgentRequest,
        options: &InvocationOptions,
    ) -> Result<AgentOutcome, AgentFailure> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), *options));
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(AgentStep::Reply(outcome)) => Ok(outcome),
            Some(AgentStep::Fail(failure)) => Err(failure),
            Some(AgentStep::Hang) => std::future::pending().await,
            None => Ok(AgentOutcome::text(format!("{} handled: {}", self.id, request.query))),
        }
    }
}

/// Answers `echo: <query>` after a fixed delay.
pub(crate) struct EchoAgent {
    delay: Duration,
}

impl EchoAgent {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AgentInvoker for EchoAgent {
    async fn invoke(
        &self,
        request: &AgentRequest,
        _options: &InvocationOptions,
    ) -> Result<AgentOutcome, AgentFailure> {
        tokio::time::sleep(self.delay).await;
        Ok(AgentOutcome::text(format!("echo: {}", request.query)))
    }
}
