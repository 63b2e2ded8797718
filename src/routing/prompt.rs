//! Classifier prompt construction.
//!
//! The prompt is two messages: a system message with the routing rules and
//! the live-agent summary, and a user message carrying recent history, known
//! entities and the utterance to route. History is rendered as a transcript
//! rather than replayed as chat turns so the model answers the routing
//! question instead of continuing the conversation.

use crate::agents::RegistrySnapshot;
use crate::context::{ConversationContext, Speaker};
use crate::inference::ChatMessage;

use super::types::Utterance;

// ─── Constants ───────────────────────────────────────────────────────────────

const ROUTING_INSTRUCTIONS: &str = "\
You are the router of a multi-agent assistant. Read the user's request and \
pick the single agent best suited to handle it. If several agents are needed, \
pick the one that should act first. If no agent fits, or the request is too \
vague to route, answer with agent \"none\".

Available agents:
{agents}

Respond with exactly one JSON object and nothing else:
{
  \"agent\": \"<agent id or none>\",
  \"confidence\": <number between 0 and 1>,
  \"reason\": \"<one short sentence>\",
  \"reformulated_query\": \"<the request, rewritten for clarity if needed>\"
}";

/// Entity values longer than this are cut in the prompt.
const MAX_ENTITY_CHARS: usize = 200;

// ─── Settings ────────────────────────────────────────────────────────────────

/// How much conversation the classifier sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSettings {
    /// Number of most recent turns included.
    pub history_turns: usize,
    /// Per-turn content limit in bytes, cut on a UTF-8 boundary.
    pub max_turn_chars: usize,
    /// Longest utterance, in characters, sent to the model.
    pub max_utterance_chars: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            history_turns: 6,
            max_turn_chars: 500,
            max_utterance_chars: 32_000,
        }
    }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Build the classifier messages for one utterance.
pub fn build_classifier_prompt(
    utterance: &Utterance,
    context: &ConversationContext,
    agents: &RegistrySnapshot,
    settings: &PromptSettings,
) -> Vec<ChatMessage> {
    let system = ROUTING_INSTRUCTIONS.replace("{agents}", &agents.capability_summary());

    let mut user = String::new();

    let history = context.recent_turns(settings.history_turns);
    if !history.is_empty() {
        user.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match (turn.speaker, turn.agent_id.as_deref()) {
                (Speaker::User, _) => "user",
                (Speaker::Agent, Some(id)) => id,
                (Speaker::Agent, None) => "agent",
                (Speaker::System, _) => "router",
            };
            let content = truncate_utf8(&turn.content, settings.max_turn_chars);
            user.push_str(&format!("[{speaker}] {content}\n"));
        }
        user.push('\n');
    }

    if !context.entities().is_empty() {
        user.push_str("Known entities:\n");
        for (key, value) in context.entities() {
            let rendered = value.to_string();
            user.push_str(&format!("- {key}: {}\n", truncate_utf8(&rendered, MAX_ENTITY_CHARS)));
        }
        user.push('\n');
    }

    user.push_str("Request to route:\n");
    user.push_str(utterance.text.trim());

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The first `max_chars` characters of `s`.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
