//! Conversation context types.
//!
//! A [`ConversationContext`] is the complete shared state of one session:
//! ordered turns, the entity map and task states. It is only ever mutated
//! inside [`super::ContextStore`]; everyone else holds an immutable
//! [`ContextSnapshot`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ContextError;

/// Entity key → value. Keys are unique; values are arbitrary JSON.
pub type EntityMap = BTreeMap<String, Value>;

/// An immutable, cheaply cloned view of a session's context.
pub type ContextSnapshot = Arc<ConversationContext>;

// ─── Turns ───────────────────────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
    /// Clarification prompts and degraded responses produced by the router itself.
    System,
}

/// A committed conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Strictly increasing within a session, starting at 1.
    pub turn_number: u64,
    pub speaker: Speaker,
    pub content: String,
    /// The agent that produced this turn, for `Speaker::Agent`.
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A turn waiting to be appended. The store assigns number and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub speaker: Speaker,
    pub content: String,
    pub agent_id: Option<String>,
}

impl NewTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
            agent_id: None,
        }
    }

    pub fn agent(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            content: content.into(),
            agent_id: Some(agent_id.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            content: content.into(),
            agent_id: None,
        }
    }
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Blocked,
}

impl TaskStatus {
    /// Whether `self → next` is an allowed transition.
    ///
    /// Allowed: pending→active, active→completed, active→blocked,
    /// blocked→active. Staying in the same status is a refresh, not a
    /// transition, and is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Active) | (Active, Completed) | (Active, Blocked) | (Blocked, Active)
            )
    }

    /// Whether a task may be created directly in this status.
    pub fn is_initial(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of work. Tasks are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub status: TaskStatus,
    /// Entity keys the task refers to.
    pub entities: BTreeSet<String>,
    pub owner_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested create-or-update of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    /// Entity keys to associate. Existing associations are kept.
    #[serde(default)]
    pub entities: BTreeSet<String>,
    /// New owner. `None` keeps the current owner.
    #[serde(default)]
    pub owner_agent: Option<String>,
}

impl TaskUpdate {
    pub fn new(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            entities: BTreeSet::new(),
            owner_agent: None,
        }
    }

    pub fn with_entities<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn owned_by(mut self, agent_id: impl Into<String>) -> Self {
        self.owner_agent = Some(agent_id.into());
        self
    }
}

// ─── Merge Results ───────────────────────────────────────────────────────────

/// What an entity merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMergeReport {
    /// Keys that did not exist before.
    pub added: Vec<String>,
    /// Keys whose value changed, with the value they held before.
    pub overwritten: BTreeMap<String, Value>,
    /// Keys written with the value they already held.
    pub unchanged: Vec<String>,
}

impl EntityMergeReport {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.overwritten.is_empty()
    }
}

/// Everything a single dispatch commits, applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub turns: Vec<NewTurn>,
    pub entities: EntityMap,
    pub task: Option<TaskUpdate>,
}

impl ContextUpdate {
    pub fn with_turn(mut self, turn: NewTurn) -> Self {
        self.turns.push(turn);
        self
    }

    pub fn with_entities(mut self, entities: EntityMap) -> Self {
        self.entities.extend(entities);
        self
    }

    pub fn with_task(mut self, task: Option<TaskUpdate>) -> Self {
        self.task = task;
        self
    }
}

// ─── ConversationContext ─────────────────────────────────────────────────────

/// Ordered turns, entities and tasks for one session, plus a version that
/// increases by one with every committed change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    turns: Vec<Turn>,
    entities: EntityMap,
    tasks: BTreeMap<String, TaskState>,
    version: u64,
}

impl ConversationContext {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn entity(&self, key: &str) -> Option<&Value> {
        self.entities.get(key)
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskState> {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskState> {
        self.tasks.get(task_id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of the newest turn, or 0 for an empty conversation.
    pub fn last_turn_number(&self) -> u64 {
        self.turns.last().map(|t| t.turn_number).unwrap_or(0)
    }

    // ─── Mutation (store only) ───────────────────────────────────────────

    pub(super) fn push_turn(&mut self, turn: NewTurn, now: DateTime<Utc>) -> Turn {
        let committed = Turn {
            turn_number: self.last_turn_number() + 1,
            speaker: turn.speaker,
            content: turn.content,
            agent_id: turn.agent_id,
            timestamp: now,
        };
        self.turns.push(committed.clone());
        committed
    }

    pub(super) fn merge_entities(&mut self, entities: EntityMap) -> EntityMergeReport {
        let mut report = EntityMergeReport::default();
        for (key, value) in entities {
            match self.entities.get(&key) {
                None => {
                    report.added.push(key.clone());
                    self.entities.insert(key, value);
                }
                Some(existing) if *existing == value => report.unchanged.push(key),
                Some(_) => {
                    if let Some(prior) = self.entities.insert(key.clone(), value) {
                        report.overwritten.insert(key, prior);
                    }
                }
            }
        }
        report
    }

    /// Check a task update against the current task map without applying it.
    pub(super) fn check_task_update(&self, update: &TaskUpdate) -> Result<(), ContextError> {
        match self.tasks.get(&update.task_id) {
            Some(current) if !current.status.can_transition_to(update.status) => {
                Err(ContextError::InvalidTransition {
                    task_id: update.task_id.clone(),
                    from: current.status,
                    to: update.status,
                })
            }
            None if !update.status.is_initial() => Err(ContextError::InvalidInitialStatus {
                task_id: update.task_id.clone(),
                status: update.status,
            }),
            _ => Ok(()),
        }
    }

    pub(super) fn apply_task_update(
        &mut self,
        update: TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<TaskState, ContextError> {
        self.check_task_update(&update)?;
        let task = self
            .tasks
            .entry(update.task_id.clone())
            .or_insert_with(|| TaskState {
                id: update.task_id.clone(),
                status: update.status,
                entities: BTreeSet::new(),
                owner_agent: None,
                created_at: now,
                updated_at: now,
            });
        task.status = update.status;
        task.entities.extend(update.entities);
        if update.owner_agent.is_some() {
            task.owner_agent = update.owner_agent;
        }
        task.updated_at = now;
        Ok(task.clone())
    }

    pub(super) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allowed_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Blocked));
        assert!(Blocked.can_transition_to(Active));
        assert!(Active.can_transition_to(Active));
    }

    #[test]
    fn test_forbidden_transitions() {
        use TaskStatus::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Blocked));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Blocked.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_turn_numbers_start_at_one() {
        let mut ctx = ConversationContext::default();
        assert_eq!(ctx.last_turn_number(), 0);
        let first = ctx.push_turn(NewTurn::user("hi"), Utc::now());
        let second = ctx.push_turn(NewTurn::agent("search", "hello"), Utc::now());
        assert_eq!(first.turn_number, 1);
        assert_eq!(second.turn_number, 2);
        assert_eq!(second.agent_id.as_deref(), Some("search"));
    }

    #[test]
    fn test_recent_turns_window() {
        let mut ctx = ConversationContext::default();
        for i in 0..5 {
            ctx.push_turn(NewTurn::user(format!("m{i}")), Utc::now());
        }
        let recent = ctx.recent_turns(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(ctx.recent_turns(50).len(), 5);
    }

    #[test]
    fn test_merge_reports_prior_values() {
        let mut ctx = ConversationContext::default();
        ctx.merge_entities(EntityMap::from([("city".into(), json!("Paris"))]));

        let report = ctx.merge_entities(EntityMap::from([
            ("city".into(), json!("Lyon")),
            ("date".into(), json!("2024-05-01")),
        ]));
        assert_eq!(report.added, vec!["date".to_string()]);
        assert_eq!(report.overwritten.get("city"), Some(&json!("Paris")));
        assert_eq!(ctx.entity("city"), Some(&json!("Lyon")));
    }

    #[test]
    fn test_new_task_must_start_pending_or_active() {
        let mut ctx = ConversationContext::default();
        let err = ctx
            .apply_task_update(TaskUpdate::new("t1", TaskStatus::Completed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidInitialStatus { .. }));
        assert!(ctx.task("t1").is_none());
    }

    #[test]
    fn test_task_update_keeps_owner_and_entities() {
        let mut ctx = ConversationContext::default();
        ctx.apply_task_update(
            TaskUpdate::new("t1", TaskStatus::Pending)
                .owned_by("data")
                .with_entities(["table"]),
            Utc::now(),
        )
        .unwrap();
        let task = ctx
            .apply_task_update(
                TaskUpdate::new("t1", TaskStatus::Active).with_entities(["row"]),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.owner_agent.as_deref(), Some("data"));
        assert_eq!(task.entities.len(), 2);
    }

    #[test]
    fn test_context_serde_round_trip_keeps_version() {
        let mut ctx = ConversationContext::default();
        ctx.push_turn(NewTurn::user("hi"), Utc::now());
        ctx.bump_version();
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ConversationContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.version(), 1);
    }
}
