//! Live session registry.
//!
//! Two indexes: transport connection id → state, and external session id →
//! connection id. The external index is written before a session becomes
//! visible so update producers can resolve it as soon as it is registered.

use crate::domain::ids::{ConnectionId, ExternalSessionId};
use crate::ws::session::SessionState;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Arc<SessionState>>,
    by_external: DashMap<ExternalSessionId, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_external(&self, external_id: ExternalSessionId, conn_id: ConnectionId) {
        self.by_external.insert(external_id, conn_id);
    }

    /// Remove the external link if it still points at `conn_id`.
    pub fn unlink_external(&self, external_id: &ExternalSessionId, conn_id: ConnectionId) {
        self.by_external.remove_if(external_id, |_, c| *c == conn_id);
    }

    pub fn insert(&self, state: Arc<SessionState>) {
        self.sessions.insert(state.conn_id(), state);
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<SessionState>> {
        self.sessions.get(conn_id).map(|s| Arc::clone(s.value()))
    }

    pub fn get_by_external(&self, external_id: &ExternalSessionId) -> Option<Arc<SessionState>> {
        let conn_id = *self.by_external.get(external_id)?;
        self.get(&conn_id)
    }

    /// Remove a session and its external link. Only the first caller for a
    /// given connection gets the state back.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<SessionState>> {
        let (_, state) = self.sessions.remove(conn_id)?;
        self.unlink_external(state.external_id(), *conn_id);
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of live sessions.
    pub fn sessions(&self) -> Vec<Arc<SessionState>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }
}
