//! # Partition Router
//!
//! Decides per (tenant, entity) whether work runs here or is forwarded to
//! the partition owner. Forwarding is fire-and-forget and at-most-once;
//! failures are logged and counted, never surfaced to the caller.

use crate::domain::ids::{EntityId, TenantId};
use crate::metrics::GatewayMetrics;
use crate::routing::messages::ClusterMessage;
use crate::routing::partition::PartitionService;
use cluster_bus::{ClusterTransport, NodeId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a routed call ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Local action ran synchronously.
    Local,
    /// Message handed to the cluster transport for this node.
    Forwarded(NodeId),
    /// Remote partition without a known owner; message dropped.
    Unassigned,
}

pub struct PartitionRouter {
    partitions: Arc<PartitionService>,
    transport: Arc<dyn ClusterTransport>,
    metrics: Arc<GatewayMetrics>,
}

impl PartitionRouter {
    pub fn new(
        partitions: Arc<PartitionService>,
        transport: Arc<dyn ClusterTransport>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            partitions,
            transport,
            metrics,
        }
    }

    pub fn partitions(&self) -> &Arc<PartitionService> {
        &self.partitions
    }

    pub fn local_node(&self) -> &NodeId {
        self.partitions.node_id()
    }

    /// Run `local` if this node owns the pair's partition, otherwise build
    /// a message with `remote` and forward it to the owner.
    ///
    /// Ownership and the forward target come from one snapshot, read fresh
    /// on every call.
    pub fn route<L, R>(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
        local: L,
        remote: R,
    ) -> RouteOutcome
    where
        L: FnOnce(),
        R: FnOnce() -> ClusterMessage,
    {
        let (tpi, owner) = self.partitions.resolve_owner(tenant_id, entity_id);
        if tpi.my_partition {
            local();
            return RouteOutcome::Local;
        }

        match owner {
            Some(owner) => {
                self.forward_to(owner.clone(), remote());
                RouteOutcome::Forwarded(owner)
            }
            None => {
                warn!(
                    tenant_id = %tenant_id,
                    entity_id = %entity_id,
                    partition = tpi.partition,
                    "No owner for remote partition, dropping"
                );
                self.metrics.record_cluster_forward(false);
                RouteOutcome::Unassigned
            }
        }
    }

    /// Forward `message` to `target` without waiting for the result.
    pub fn forward_to(&self, target: NodeId, message: ClusterMessage) {
        let payload = match message.encode() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, message = message.name(), "Failed to encode cluster message");
                self.metrics.record_cluster_forward(false);
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let metrics = Arc::clone(&self.metrics);
        let name = message.name();
        tokio::spawn(async move {
            match transport.send(&target, payload).await {
                Ok(()) => {
                    debug!(target = %target, message = name, "Forwarded to partition owner");
                    metrics.record_cluster_forward(true);
                }
                Err(e) => {
                    warn!(target = %target, message = name, error = %e, "Cluster forward failed");
                    metrics.record_cluster_forward(false);
                }
            }
        });
    }
}
