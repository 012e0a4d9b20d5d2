//! # Outbound Dispatcher
//!
//! Per-session bounded queue drained by a single-flight send loop.
//!
//! ```text
//!  producers ──send()──► [ queue ≤ cap ] ──► send loop ──► transport
//!                              │                 │
//!                    cap hit: clear + close    write error / timeout:
//!                    (policy violation)        clear + close (not reliable)
//! ```
//!
//! At most one message per session is in flight. The loop is iterative:
//! when the queue runs dry it releases the flag, then re-checks so a
//! message enqueued during the release is not stranded.
//!
//! Each session's loop owns its own task and awaits the transport write
//! directly, bounded only by the send timeout. A stalled consumer holds
//! nothing shared with other sessions.

use crate::domain::close::CloseStatus;
use crate::domain::error::{SendError, TransportError};
use crate::metrics::GatewayMetrics;
use crate::ws::session::SessionState;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reason sent when the outbound queue overflows.
pub const QUEUE_OVERFLOW_REASON: &str = "Max pending updates limit reached!";

/// One outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
}

struct QueueInner {
    items: VecDeque<Outbound>,
    /// Queued plus in flight.
    occupied: usize,
}

pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    sending: AtomicBool,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                occupied: 0,
            }),
            sending: AtomicBool::new(false),
        }
    }

    pub fn occupied(&self) -> usize {
        self.inner.lock().occupied
    }

    /// Enqueue unless the cap is reached. On overflow the queue is cleared.
    fn push_bounded(&self, msg: Outbound, cap: usize) -> bool {
        let mut inner = self.inner.lock();
        if inner.occupied >= cap {
            inner.items.clear();
            inner.occupied = 0;
            return false;
        }
        inner.items.push_back(msg);
        inner.occupied += 1;
        true
    }

    fn pop(&self) -> Option<Outbound> {
        self.inner.lock().items.pop_front()
    }

    fn complete_one(&self) {
        let mut inner = self.inner.lock();
        inner.occupied = inner.occupied.saturating_sub(1);
    }

    fn has_queued(&self) -> bool {
        !self.inner.lock().items.is_empty()
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.occupied = 0;
    }

    fn try_claim(&self) -> bool {
        self.sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.sending.store(false, Ordering::Release);
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }
}

/// Hands messages to session send loops.
#[derive(Clone)]
pub struct OutboundDispatcher {
    send_timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl OutboundDispatcher {
    pub fn new(send_timeout: Duration, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            send_timeout,
            metrics,
        }
    }

    /// Enqueue `msg` for `state` and make sure a send loop is running.
    ///
    /// On overflow the queue is dropped and the session is closed with a
    /// policy violation; further calls return [`SendError::Closed`].
    pub fn send(&self, state: &Arc<SessionState>, msg: Outbound) -> Result<(), SendError> {
        if state.is_closed() {
            return Err(SendError::Closed);
        }

        if !state.outbound.push_bounded(msg, state.max_queue()) {
            self.metrics.record_queue_overflow();
            warn!(
                conn_id = %state.conn_id(),
                session_id = %state.external_id(),
                max_queue = state.max_queue(),
                "Outbound queue overflow, closing session"
            );
            state.close_detached(CloseStatus::policy_violation(QUEUE_OVERFLOW_REASON));
            return Err(SendError::QueueOverflow);
        }

        if state.outbound.try_claim() {
            let this = self.clone();
            let state = Arc::clone(state);
            tokio::spawn(async move {
                this.drain(state).await;
            });
        }
        Ok(())
    }

    async fn drain(&self, state: Arc<SessionState>) {
        loop {
            while let Some(msg) = state.outbound.pop() {
                if state.is_closed() {
                    state.outbound.clear();
                    break;
                }
                let is_ping = matches!(msg, Outbound::Ping);
                let result = self.write(&state, msg).await;
                state.outbound.complete_one();

                match result {
                    Ok(()) if is_ping => self.metrics.record_ping(),
                    Ok(()) => self.metrics.record_message_sent(),
                    Err(e) => {
                        self.metrics.record_send_failure();
                        warn!(
                            conn_id = %state.conn_id(),
                            session_id = %state.external_id(),
                            error = %e,
                            "Failed to send message, closing session"
                        );
                        state.outbound.clear();
                        state.outbound.release();
                        state.close(CloseStatus::not_reliable()).await;
                        return;
                    }
                }
            }

            state.outbound.release();
            if !state.outbound.has_queued() || !state.outbound.try_claim() {
                return;
            }
            debug!(conn_id = %state.conn_id(), "Re-claimed send loop");
        }
    }

    async fn write(&self, state: &SessionState, msg: Outbound) -> Result<(), TransportError> {
        let transport = state.transport();
        let send = async {
            match msg {
                Outbound::Text(text) => transport.send_text(text).await,
                Outbound::Ping => transport.send_ping().await,
            }
        };
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Io(format!(
                "send timed out after {}ms",
                self.send_timeout.as_millis()
            ))),
        }
    }
}
