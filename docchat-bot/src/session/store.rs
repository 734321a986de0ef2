//! In-memory session store with per-user slots.
//!
//! Each user gets a slot guarded by its own `tokio::sync::Mutex`. Holding the
//! slot serializes everything that user does, including network calls made
//! while it is held, without blocking other users. The `DashMap` only guards
//! slot lookup. A slot left empty with nobody waiting on it is evicted when
//! its guard drops.

use super::types::Session;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<Session>>>;

/// Process-local mapping from user ID to session.
#[derive(Clone, Default)]
pub struct SessionStore {
    slots: Arc<DashMap<String, Slot>>,
    active: Arc<AtomicUsize>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: &str) -> Slot {
        self.slots.entry(user_id.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to a user's slot.
    pub async fn lock(&self, user_id: &str) -> SessionSlot {
        let guard = self.slot(user_id).lock_owned().await;
        SessionSlot {
            guard,
            user_id: user_id.to_string(),
            slots: Arc::clone(&self.slots),
            active: Arc::clone(&self.active),
        }
    }

    /// Snapshot of a user's session.
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        self.lock(user_id).await.session().cloned()
    }

    /// Store a session under its user ID, returning the one it displaced.
    pub async fn put(&self, session: Session) -> Option<Session> {
        let user_id = session.user_id().to_string();
        self.lock(&user_id).await.put(session)
    }

    /// Empty a user's history. Returns `false` when the user has no session.
    pub async fn clear_history(&self, user_id: &str) -> bool {
        self.lock(user_id).await.clear_history()
    }

    pub async fn remove(&self, user_id: &str) -> Option<Session> {
        self.lock(user_id).await.remove()
    }

    /// Number of users with a live session.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of users currently holding a slot.
    pub fn tracked_users(&self) -> usize {
        self.slots.len()
    }
}

/// Exclusive handle on one user's session; released on drop.
pub struct SessionSlot {
    guard: OwnedMutexGuard<Option<Session>>,
    user_id: String,
    slots: Arc<DashMap<String, Slot>>,
    active: Arc<AtomicUsize>,
}

impl SessionSlot {
    pub fn session(&self) -> Option<&Session> {
        self.guard.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.guard.as_mut()
    }

    pub fn put(&mut self, session: Session) -> Option<Session> {
        let displaced = self.guard.replace(session);
        if displaced.is_none() {
            self.active.fetch_add(1, Ordering::Relaxed);
        }
        displaced
    }

    pub fn clear_history(&mut self) -> bool {
        match self.guard.as_mut() {
            Some(session) => {
                session.clear_history();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self) -> Option<Session> {
        let removed = self.guard.take();
        if removed.is_some() {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // Two owners means the map and this guard; nobody else is queued on the slot.
        let ours = OwnedMutexGuard::mutex(&self.guard);
        self.slots.remove_if(&self.user_id, |_, slot| {
            Arc::ptr_eq(slot, ours) && Arc::strong_count(slot) == 2
        });
    }
}
