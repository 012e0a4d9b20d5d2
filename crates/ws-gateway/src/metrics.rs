//! Gateway counters, exported as JSON on the admin `/metrics` route.

use std::sync::atomic::{AtomicU64, Ordering};

/// Session and delivery metrics
#[derive(Default)]
pub struct GatewayMetrics {
    // Session lifecycle
    pub sessions_established: AtomicU64,
    pub sessions_active: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub sessions_refused: AtomicU64,
    pub pending_auth: AtomicU64,
    pub auth_timeouts: AtomicU64,
    pub auth_failures: AtomicU64,

    // Outbound
    pub messages_sent: AtomicU64,
    pub queue_overflows: AtomicU64,
    pub send_failures: AtomicU64,
    pub pings_sent: AtomicU64,
    pub ping_timeouts: AtomicU64,
    pub updates_rate_limited: AtomicU64,

    // Inbound
    pub frames_received: AtomicU64,
    pub decode_errors: AtomicU64,

    // Cluster
    pub cluster_forwards: AtomicU64,
    pub cluster_forward_failures: AtomicU64,
    pub cluster_received: AtomicU64,
}

fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn dec(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pending(&self) {
        inc(&self.pending_auth);
    }

    pub fn record_pending_done(&self) {
        dec(&self.pending_auth);
    }

    pub fn record_auth_timeout(&self) {
        inc(&self.auth_timeouts);
    }

    pub fn record_auth_failure(&self) {
        inc(&self.auth_failures);
    }

    pub fn record_established(&self) {
        inc(&self.sessions_established);
        inc(&self.sessions_active);
    }

    pub fn record_closed(&self) {
        inc(&self.sessions_closed);
        dec(&self.sessions_active);
    }

    pub fn record_refused(&self) {
        inc(&self.sessions_refused);
    }

    pub fn record_message_sent(&self) {
        inc(&self.messages_sent);
    }

    pub fn record_queue_overflow(&self) {
        inc(&self.queue_overflows);
    }

    pub fn record_send_failure(&self) {
        inc(&self.send_failures);
    }

    pub fn record_ping(&self) {
        inc(&self.pings_sent);
    }

    pub fn record_ping_timeout(&self) {
        inc(&self.ping_timeouts);
    }

    pub fn record_rate_limited(&self) {
        inc(&self.updates_rate_limited);
    }

    pub fn record_frame(&self) {
        inc(&self.frames_received);
    }

    pub fn record_decode_error(&self) {
        inc(&self.decode_errors);
    }

    pub fn record_cluster_forward(&self, success: bool) {
        if success {
            inc(&self.cluster_forwards);
        } else {
            inc(&self.cluster_forward_failures);
        }
    }

    pub fn record_cluster_received(&self) {
        inc(&self.cluster_received);
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "sessions": {
                "established": get(&self.sessions_established),
                "active": get(&self.sessions_active),
                "closed": get(&self.sessions_closed),
                "refused": get(&self.sessions_refused),
                "pending_auth": get(&self.pending_auth),
                "auth_timeouts": get(&self.auth_timeouts),
                "auth_failures": get(&self.auth_failures),
            },
            "outbound": {
                "messages_sent": get(&self.messages_sent),
                "queue_overflows": get(&self.queue_overflows),
                "send_failures": get(&self.send_failures),
                "pings_sent": get(&self.pings_sent),
                "ping_timeouts": get(&self.ping_timeouts),
                "updates_rate_limited": get(&self.updates_rate_limited),
            },
            "inbound": {
                "frames_received": get(&self.frames_received),
                "decode_errors": get(&self.decode_errors),
            },
            "cluster": {
                "forwards": get(&self.cluster_forwards),
                "forward_failures": get(&self.cluster_forward_failures),
                "received": get(&self.cluster_received),
            }
        })
    }
}
