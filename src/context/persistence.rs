//! Optional persistence for session contexts.
//!
//! The coordinator calls [`ContextPersistence::load`] the first time it sees
//! a session and [`ContextPersistence::save`] after every completed turn.
//! [`SqlitePersistence`] stores one JSON snapshot per session.
//!
//! Uses `rusqlite` in synchronous mode; calls are short single-row
//! statements. WAL mode is enabled so readers don't block the writer.

use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::errors::ContextError;
use super::types::ConversationContext;

/// Storage collaborator for session contexts.
pub trait ContextPersistence: Send + Sync {
    /// Persist the latest committed context of a session.
    fn save(&self, session_id: &str, context: &ConversationContext) -> Result<(), ContextError>;

    /// Load a previously saved context, if any.
    fn load(&self, session_id: &str) -> Result<Option<ConversationContext>, ContextError>;
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

/// SQLite-backed [`ContextPersistence`].
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl SqlitePersistence {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, ContextError> {
        let conn = Connection::open(path)?;

        // `journal_mode` returns a row, so it can't go through `execute`.
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS session_contexts (
                session_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Stored version for a session, without decoding the snapshot.
    pub fn stored_version(&self, session_id: &str) -> Result<Option<u64>, ContextError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let version = conn
            .query_row(
                "SELECT version FROM session_contexts WHERE session_id = ?1",
                params![session_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(version.map(|v| v as u64))
    }
}

impl ContextPersistence for SqlitePersistence {
    fn save(&self, session_id: &str, context: &ConversationContext) -> Result<(), ContextError> {
        let snapshot = serde_json::to_string(context)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO session_contexts (session_id, version, snapshot, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(session_id) DO UPDATE SET
                 version = excluded.version,
                 snapshot = excluded.snapshot,
                 updated_at = excluded.updated_at",
            params![session_id, context.version() as i64, snapshot],
        )?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ConversationContext>, ContextError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let raw: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM session_contexts WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(ContextError::from))
            .transpose()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
