//! Query staging store
//!
//! Holds at most one generated statement per session between the
//! generation and execution calls. Taking an entry removes it in the same
//! map operation, so two concurrent executions can never both see it.

use crate::error::{GatewayError, Result};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuery {
    pub question: String,
    pub sql: String,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct QueryStagingStore {
    pending: DashMap<SessionId, PendingQuery>,
}

impl QueryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a statement, replacing whatever was pending.
    pub fn stage(&self, session: SessionId, question: impl Into<String>, sql: impl Into<String>) {
        let entry = PendingQuery {
            question: question.into(),
            sql: sql.into(),
            staged_at: Utc::now(),
        };
        if self.pending.insert(session, entry).is_some() {
            debug!(session = %session, "replaced previously staged query");
        }
    }

    pub fn take_and_clear(&self, session: SessionId) -> Result<PendingQuery> {
        self.pending
            .remove(&session)
            .map(|(_, entry)| entry)
            .ok_or(GatewayError::NoPendingQuery)
    }

    pub fn peek(&self, session: SessionId) -> Option<PendingQuery> {
        self.pending.get(&session).map(|e| e.clone())
    }

    pub fn clear(&self, session: SessionId) {
        self.pending.remove(&session);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn stage_then_take_returns_the_pair_once() {
        let store = QueryStagingStore::new();
        let session = SessionId::new();
        store.stage(session, "how many students", "SELECT COUNT(*) FROM students");

        let taken = store.take_and_clear(session).unwrap();
        assert_eq!(taken.question, "how many students");
        assert_eq!(taken.sql, "SELECT COUNT(*) FROM students");

        assert!(matches!(
            store.take_and_clear(session),
            Err(GatewayError::NoPendingQuery)
        ));
    }

    #[test]
    fn later_stage_wins() {
        let store = QueryStagingStore::new();
        let session = SessionId::new();
        store.stage(session, "first", "SELECT 1");
        store.stage(session, "second", "SELECT 2");

        assert_eq!(store.len(), 1);
        assert_eq!(store.take_and_clear(session).unwrap().sql, "SELECT 2");
    }

    #[test]
    fn sessions_do_not_see_each_other() {
        let store = QueryStagingStore::new();
        let a = SessionId::new();
        let b = SessionId::new();
        store.stage(a, "q", "SELECT 1");

        assert!(store.peek(b).is_none());
        assert!(store.take_and_clear(b).is_err());
        assert!(store.peek(a).is_some());
    }

    #[test]
    fn concurrent_takes_observe_the_entry_once() {
        let store = Arc::new(QueryStagingStore::new());
        let session = SessionId::new();
        store.stage(session, "q", "DELETE FROM t");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.take_and_clear(session).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(winners, 1);
        assert!(store.is_empty());
    }
}
