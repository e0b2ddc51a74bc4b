//! Connection registry
//!
//! Process-wide map from session to its live database handle. Each session
//! owns a slot guarded by a read/write lock: operations hold a read lease
//! for as long as they use the handle, and replacing or removing the handle
//! takes the write lock, so an in-flight query never loses its pool.

use crate::connection_url::{redact, ConnectionTarget};
use crate::db::{ConnectionHandle, PoolSettings};
use crate::error::{GatewayError, Result};
use crate::session::SessionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

struct Slot {
    handle: Arc<RwLock<ConnectionHandle>>,
    last_used: Mutex<Instant>,
}

impl Slot {
    fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle: Arc::new(RwLock::new(handle)),
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

/// Shared access to a session's handle. While a lease is alive the handle
/// cannot be replaced or closed.
pub struct HandleLease {
    guard: OwnedRwLockReadGuard<ConnectionHandle>,
}

impl Deref for HandleLease {
    type Target = ConnectionHandle;

    fn deref(&self) -> &ConnectionHandle {
        &self.guard
    }
}

pub struct ConnectionRegistry {
    slots: DashMap<SessionId, Arc<Slot>>,
    settings: PoolSettings,
}

impl ConnectionRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            slots: DashMap::new(),
            settings,
        }
    }

    /// Opens a connection for `target` and binds it to `session`. On failure
    /// the session keeps whatever handle it had before.
    pub async fn register(&self, session: SessionId, target: &ConnectionTarget) -> Result<()> {
        let url = target.to_url()?;
        let handle = ConnectionHandle::open(&url, &self.settings)
            .await
            .map_err(|e| {
                warn!(session = %session, url = %redact(&url), error = %e, "connection attempt failed");
                e
            })?;
        self.install(session, handle).await;
        Ok(())
    }

    /// Binds an already-open handle to `session`, closing any handle it
    /// replaces once in-flight users release it.
    pub async fn install(&self, session: SessionId, handle: ConnectionHandle) {
        let slot = match self.slots.entry(session) {
            Entry::Vacant(vacant) => {
                info!(session = %session, dialect = %handle.dialect(), "connection registered");
                vacant.insert(Arc::new(Slot::new(handle)));
                return;
            }
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
        };

        let old = {
            let mut guard = slot.handle.write().await;
            std::mem::replace(&mut *guard, handle)
        };
        slot.touch();
        info!(
            session = %session,
            previous = %old.display_url(),
            previous_opened_at = %old.opened_at(),
            "connection replaced"
        );
        old.close().await;
    }

    pub async fn get(&self, session: SessionId) -> Result<HandleLease> {
        let slot = self
            .slots
            .get(&session)
            .map(|s| Arc::clone(s.value()))
            .ok_or(GatewayError::NotConnected)?;
        slot.touch();
        let guard = Arc::clone(&slot.handle).read_owned().await;
        Ok(HandleLease { guard })
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.slots.contains_key(&session)
    }

    /// Drops the session's handle and closes it. Returns whether one existed.
    pub async fn remove(&self, session: SessionId) -> bool {
        match self.slots.remove(&session) {
            Some((_, slot)) => {
                close_slot(&slot).await;
                debug!(session = %session, "connection removed");
                true
            }
            None => false,
        }
    }

    /// Removes and closes every handle unused for at least `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let candidates: Vec<SessionId> = self
            .slots
            .iter()
            .filter(|entry| entry.value().idle_for() >= max_idle)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::new();
        for session in candidates {
            if let Some((_, slot)) = self
                .slots
                .remove_if(&session, |_, slot| slot.idle_for() >= max_idle)
            {
                close_slot(&slot).await;
                evicted.push(session);
            }
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted idle connections");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

async fn close_slot(slot: &Slot) {
    let guard = slot.handle.write().await;
    guard.close().await;
}
