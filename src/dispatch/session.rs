//! Session table.
//!
//! Each session owns a context store and a turn gate. The gate is a
//! `tokio::sync::Mutex`, which queues waiters in FIFO order, so turns of one
//! session run one at a time in arrival order while different sessions run
//! in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::context::{ContextPersistence, ContextStore};

pub(crate) struct Session {
    pub(crate) store: ContextStore,
    pub(crate) gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
pub(crate) struct SessionTable {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionTable {
    /// Get a session, creating it on first use.
    ///
    /// A new session is seeded from persistence when a saved context exists.
    /// Load failures are logged and the session starts empty.
    pub(crate) fn open(
        &self,
        session_id: &str,
        persistence: Option<&dyn ContextPersistence>,
    ) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(session_id) {
            return Arc::clone(session);
        }

        let store = match persistence.map(|p| p.load(session_id)) {
            Some(Ok(Some(context))) => {
                tracing::info!(
                    session_id,
                    version = context.version(),
                    turns = context.turns().len(),
                    "session restored"
                );
                ContextStore::from_context(session_id, context)
            }
            Some(Err(e)) => {
                tracing::warn!(session_id, error = %e, "failed to load session, starting empty");
                ContextStore::new(session_id)
            }
            _ => ContextStore::new(session_id),
        };

        let session = Arc::new(Session {
            store,
            gate: tokio::sync::Mutex::new(()),
        });
        sessions.insert(session_id.to_string(), Arc::clone(&session));
        session
    }

    pub(crate) fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NewTurn, SqlitePersistence};

    #[test]
    fn test_open_returns_same_session() {
        let table = SessionTable::default();
        let a = table.open("s1", None);
        let b = table.open("s1", None);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(table.get("s2").is_none());
        assert_eq!(table.ids(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_open_restores_from_persistence() {
        let db = SqlitePersistence::open(":memory:").unwrap();
        let seed = ContextStore::new("s1");
        seed.append_turn(NewTurn::user("remember me"));
        db.save("s1", &seed.snapshot()).unwrap();

        let table = SessionTable::default();
        let session = table.open("s1", Some(&db));
        assert_eq!(session.store.snapshot().turns()[0].content, "remember me");
        assert!(table.open("s2", Some(&db)).store.snapshot().turns().is_empty());
    }
}
