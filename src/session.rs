//! Session identity and per-session credentials

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, server-issued session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone)]
struct Credential {
    api_key: String,
    set_at: DateTime<Utc>,
}

/// API keys for the text-generation service, one per session.
#[derive(Default)]
pub struct CredentialStore {
    keys: DashMap<SessionId, Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: SessionId, api_key: String) {
        self.keys.insert(
            session,
            Credential {
                api_key,
                set_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, session: SessionId) -> Option<String> {
        self.keys.get(&session).map(|c| c.api_key.clone())
    }

    pub fn remove(&self, session: SessionId) -> bool {
        self.keys.remove(&session).is_some()
    }

    /// Drops keys set more than `max_age` ago, except for sessions `keep`
    /// still vouches for.
    pub fn remove_stale<F>(&self, max_age: std::time::Duration, keep: F) -> Vec<SessionId>
    where
        F: Fn(SessionId) -> bool,
    {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Vec::new();
        };
        let stale: Vec<SessionId> = self
            .keys
            .iter()
            .filter(|entry| entry.value().set_at <= cutoff)
            .map(|entry| *entry.key())
            .filter(|session| !keep(*session))
            .collect();

        stale
            .into_iter()
            .filter(|session| {
                self.keys
                    .remove_if(session, |_, c| c.set_at <= cutoff)
                    .is_some()
            })
            .collect()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("sessions", &self.keys.len())
            .finish()
    }
}
