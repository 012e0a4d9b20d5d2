//! Inbound ports of the gateway.

use crate::domain::ids::ExternalSessionId;
use crate::domain::update::CmdUpdate;

/// Delivery of updates to a locally connected session.
///
/// Implementations apply per-session update rate limiting; an update for a
/// session that is no longer connected is dropped.
pub trait UpdateSink: Send + Sync {
    fn send_update(&self, session_id: &ExternalSessionId, update: CmdUpdate);
}
