//! Sessions waiting for their first-frame `authCmd`.
//!
//! Entries carry a deadline. Promotion on a valid token and eviction by the
//! sweep both remove the entry atomically, so exactly one of them wins.

use crate::domain::ids::ConnectionId;
use crate::ws::session::SessionState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct PendingSession {
    state: Arc<SessionState>,
    deadline: Instant,
}

pub struct PendingAuthCache {
    pending: DashMap<ConnectionId, PendingSession>,
    timeout: Duration,
}

impl PendingAuthCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the auth clock for a session.
    pub fn put(&self, state: Arc<SessionState>, now: Instant) {
        let conn_id = state.conn_id();
        self.pending.insert(
            conn_id,
            PendingSession {
                state,
                deadline: now + self.timeout,
            },
        );
        debug!(conn_id = %conn_id, timeout_ms = self.timeout.as_millis(), "Awaiting auth");
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<SessionState>> {
        self.pending.get(conn_id).map(|p| Arc::clone(&p.state))
    }

    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.pending.contains_key(conn_id)
    }

    /// Take the session out for promotion. `None` if it already timed out.
    pub fn promote(&self, conn_id: &ConnectionId) -> Option<Arc<SessionState>> {
        self.pending.remove(conn_id).map(|(_, p)| p.state)
    }

    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<SessionState>> {
        self.pending.remove(conn_id).map(|(_, p)| p.state)
    }

    /// Remove and return every session whose deadline passed.
    pub fn evict_expired(&self, now: Instant) -> Vec<Arc<SessionState>> {
        let expired: Vec<ConnectionId> = self
            .pending
            .iter()
            .filter(|p| p.deadline <= now)
            .map(|p| *p.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|conn_id| {
                let (_, p) = self.pending.remove_if(&conn_id, |_, p| p.deadline <= now)?;
                warn!(
                    conn_id = %conn_id,
                    session_id = %p.state.external_id(),
                    timeout_ms = self.timeout.as_millis(),
                    "Auth timeout"
                );
                Some(p.state)
            })
            .collect()
    }

    /// Remove every pending session regardless of deadline.
    pub fn take_all(&self) -> Vec<Arc<SessionState>> {
        let ids: Vec<ConnectionId> = self.pending.iter().map(|p| *p.key()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
