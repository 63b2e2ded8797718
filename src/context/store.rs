//! Per-session context store.
//!
//! The current context lives behind an `RwLock<Arc<ConversationContext>>`.
//! Readers clone the `Arc` and never wait on a writer for longer than the
//! pointer copy. Writers go through `Arc::make_mut`, so a snapshot handed
//! out earlier is never modified: a write that races an outstanding reader
//! clones the context and swaps the new version in whole.
//!
//! Every method that changes something bumps the version by exactly one.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use chrono::Utc;

use super::errors::ContextError;
use super::types::{
    ContextSnapshot, ContextUpdate, ConversationContext, EntityMap, EntityMergeReport, NewTurn,
    TaskState, TaskUpdate, Turn,
};

/// The result of a successful [`ContextStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// Context version after the commit.
    pub version: u64,
    pub turns: Vec<Turn>,
    pub entities: EntityMergeReport,
    pub task: Option<TaskState>,
}

/// Versioned, append-only conversation state for one session.
pub struct ContextStore {
    session_id: String,
    state: RwLock<Arc<ConversationContext>>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::from_context(session_id, ConversationContext::default())
    }

    /// Create a store seeded with previously persisted state.
    pub fn from_context(session_id: impl Into<String>, context: ConversationContext) -> Self {
        Self {
            session_id: session_id.into(),
            state: RwLock::new(Arc::new(context)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// An immutable view of the last committed state.
    pub fn snapshot(&self) -> ContextSnapshot {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Append a turn. The store assigns the next turn number.
    pub fn append_turn(&self, turn: NewTurn) -> Turn {
        let mut guard = self.write();
        let ctx = Arc::make_mut(&mut guard);
        let committed = ctx.push_turn(turn, Utc::now());
        ctx.bump_version();
        committed
    }

    /// Last-write-wins merge. The version only moves if a value changed.
    pub fn merge_entities(&self, entities: EntityMap) -> EntityMergeReport {
        let mut guard = self.write();
        let would_change = entities
            .iter()
            .any(|(key, value)| guard.entity(key) != Some(value));
        if !would_change {
            return EntityMergeReport {
                unchanged: entities.into_keys().collect(),
                ..EntityMergeReport::default()
            };
        }
        let ctx = Arc::make_mut(&mut guard);
        let report = ctx.merge_entities(entities);
        ctx.bump_version();
        report
    }

    /// Create or transition a task.
    ///
    /// Fails with [`ContextError::InvalidTransition`] for transitions outside
    /// the allowed set; the stored state is untouched on failure.
    pub fn upsert_task_state(&self, update: TaskUpdate) -> Result<TaskState, ContextError> {
        let mut guard = self.write();
        guard.check_task_update(&update)?;
        let ctx = Arc::make_mut(&mut guard);
        let task = ctx.apply_task_update(update, Utc::now())?;
        ctx.bump_version();
        Ok(task)
    }

    /// Commit turns, entities and a task update as one change.
    ///
    /// The task transition is validated before anything is written, so either
    /// the whole update lands under a single version bump or nothing does.
    pub fn apply(&self, update: ContextUpdate) -> Result<CommitReceipt, ContextError> {
        let mut guard = self.write();
        if let Some(task) = &update.task {
            guard.check_task_update(task)?;
        }

        let now = Utc::now();
        let mut next = ConversationContext::clone(&guard);
        let turns: Vec<Turn> = update
            .turns
            .into_iter()
            .map(|turn| next.push_turn(turn, now))
            .collect();
        let entities = next.merge_entities(update.entities);
        let task = update
            .task
            .map(|task| next.apply_task_update(task, now))
            .transpose()?;
        let version = next.bump_version();

        *guard = Arc::new(next);

        tracing::debug!(
            session_id = %self.session_id,
            version,
            turns = turns.len(),
            entities_added = entities.added.len(),
            entities_overwritten = entities.overwritten.len(),
            task = task.as_ref().map(|t| t.id.as_str()).unwrap_or(""),
            "context committed"
        );

        Ok(CommitReceipt {
            version,
            turns,
            entities,
            task,
        })
    }

    // A poisoned lock still holds a complete context: every write either
    // swaps a whole `Arc` or mutates a uniquely owned copy.
    fn write(&self) -> RwLockWriteGuard<'_, Arc<ConversationContext>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
