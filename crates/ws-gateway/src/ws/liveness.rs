//! Background supervisor: liveness pings and pending-auth eviction.

use crate::ws::endpoint::WsEndpoint;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Run both sweeps until `shutdown` flips to `true` or its sender drops.
pub async fn run_supervisor(endpoint: Arc<WsEndpoint>, mut shutdown: watch::Receiver<bool>) {
    let ping_period = endpoint.config().ping_period();
    let auth_period = endpoint.config().auth_sweep_interval;

    let mut ping_tick = tokio::time::interval(ping_period);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut auth_tick = tokio::time::interval(auth_period);
    auth_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        ping_period_ms = ping_period.as_millis(),
        auth_sweep_ms = auth_period.as_millis(),
        "Session supervisor started"
    );

    loop {
        tokio::select! {
            _ = ping_tick.tick() => {
                let (pinged, closed) = endpoint.sweep_liveness(Instant::now());
                if pinged > 0 || closed > 0 {
                    debug!(pinged, closed, "Liveness sweep");
                }
            }
            _ = auth_tick.tick() => {
                let evicted = endpoint.evict_expired_pending(Instant::now());
                if evicted > 0 {
                    debug!(evicted, "Pending auth sweep");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Session supervisor stopped");
}
