//! Per-connection mutable state.

use crate::domain::close::CloseStatus;
use crate::domain::ids::{ConnectionId, ExternalSessionId};
use crate::domain::session::SessionRef;
use crate::ports::TransportSession;
use crate::ws::inbound::InboundQueue;
use crate::ws::outbound::OutboundQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Everything the gateway tracks for one live connection.
///
/// Shared behind an `Arc` between the reader loop, the send loop, the
/// liveness supervisor and update producers.
pub struct SessionState {
    conn_id: ConnectionId,
    session: Arc<SessionRef>,
    transport: Arc<dyn TransportSession>,
    pub(crate) outbound: OutboundQueue,
    pub(crate) inbound: InboundQueue,
    last_activity: Mutex<Instant>,
    max_queue: AtomicUsize,
    closed: AtomicBool,
}

impl SessionState {
    pub fn new(
        conn_id: ConnectionId,
        session: Arc<SessionRef>,
        transport: Arc<dyn TransportSession>,
        max_queue: usize,
    ) -> Self {
        Self {
            conn_id,
            session,
            transport,
            outbound: OutboundQueue::new(),
            inbound: InboundQueue::new(),
            last_activity: Mutex::new(Instant::now()),
            max_queue: AtomicUsize::new(max_queue),
            closed: AtomicBool::new(false),
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn session(&self) -> &Arc<SessionRef> {
        &self.session
    }

    pub fn external_id(&self) -> &ExternalSessionId {
        self.session.external_id()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn TransportSession> {
        &self.transport
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue.load(Ordering::Acquire)
    }

    /// Set the negotiated outbound queue cap.
    pub fn set_max_queue(&self, cap: usize) {
        self.max_queue.store(cap, Ordering::Release);
    }

    /// Messages enqueued or in flight.
    pub fn queued(&self) -> usize {
        self.outbound.occupied()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn touch(&self, now: Instant) {
        *self.last_activity.lock() = now;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the session closing. Only the first caller gets `true`.
    pub fn begin_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close once: abandon queued messages and send the close frame.
    ///
    /// Returns `false` if the session was already closing.
    pub async fn close(&self, status: CloseStatus) -> bool {
        if !self.begin_close() {
            return false;
        }
        self.finish_close(status).await;
        true
    }

    /// Second half of [`close`](Self::close) for callers that already won
    /// [`begin_close`](Self::begin_close).
    pub(crate) async fn finish_close(&self, status: CloseStatus) {
        self.outbound.clear();
        debug!(
            conn_id = %self.conn_id,
            session_id = %self.external_id(),
            code = status.code,
            reason = %status.reason,
            "Closing session"
        );
        self.transport.close(status).await;
    }

    /// Close without waiting for the transport.
    pub fn close_detached(self: &Arc<Self>, status: CloseStatus) {
        if !self.begin_close() {
            return;
        }
        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.finish_close(status).await;
        });
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("conn_id", &self.conn_id)
            .field("session_id", self.external_id())
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}
