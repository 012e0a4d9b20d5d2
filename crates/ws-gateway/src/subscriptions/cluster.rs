//! Cluster ingress: decode messages from other nodes and apply them.

use crate::routing::ClusterMessage;
use crate::subscriptions::service::SubscriptionService;
use cluster_bus::ClusterEnvelope;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Drain this node's ingress queue until it closes or `shutdown` fires.
pub async fn run_cluster_ingress(
    subscriptions: Arc<SubscriptionService>,
    mut ingress: mpsc::Receiver<ClusterEnvelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(node_id = %subscriptions.router().local_node(), "Cluster ingress started");

    loop {
        tokio::select! {
            envelope = ingress.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                match ClusterMessage::decode(&envelope.payload) {
                    Ok(message) => subscriptions.on_cluster_message(&envelope.from, message),
                    Err(e) => warn!(
                        from = %envelope.from,
                        error = %e,
                        bytes = envelope.payload.len(),
                        "Undecodable cluster message dropped"
                    ),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Cluster ingress stopped");
}
