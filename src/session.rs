//! Per-session conversation slots.
//!
//! Each session identifier owns one slot guarded by an async mutex; a turn
//! holds the lock for its whole duration, so two messages for the same session
//! are handled one after the other while different sessions proceed
//! independently. Idle slots are evicted lazily once their TTL has passed.

use crate::ambiguity::ConversationState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug)]
pub struct SessionSlot {
    pub state: Option<ConversationState>,
    last_seen: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: None,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn clear(&mut self) {
        self.state = None;
    }
}

pub struct SessionStore {
    slots: DashMap<String, Arc<Mutex<SessionSlot>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    /// Slot for a session, created on first use.
    pub fn slot(&self, session_id: &str) -> Arc<Mutex<SessionSlot>> {
        self.evict_expired();
        self.slots
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Opening session slot '{}'", session_id);
                Arc::new(Mutex::new(SessionSlot::new()))
            })
            .clone()
    }

    /// Discard any pending clarification. Waits for an in-flight turn of the
    /// same session; the slot itself stays in place. Returns whether a
    /// clarification was pending.
    pub async fn reset(&self, session_id: &str) -> bool {
        let slot = match self.slots.get(session_id) {
            Some(slot) => slot.clone(),
            None => return false,
        };
        let mut guard = slot.lock().await;
        let pending = guard.state.is_some();
        guard.clear();
        guard.touch();
        pending
    }

    /// Remove slots idle longer than the TTL. Slots currently held by a turn
    /// are never removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.slots.len();
        let ttl = self.ttl;
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.last_seen.elapsed() < ttl,
                Err(_) => true,
            }
        });
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            info!("Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the session is waiting for a clarification answer.
    pub async fn is_awaiting(&self, session_id: &str) -> bool {
        let slot = match self.slots.get(session_id) {
            Some(slot) => slot.clone(),
            None => return false,
        };
        let guard = slot.lock().await;
        guard.state.is_some()
    }
}
