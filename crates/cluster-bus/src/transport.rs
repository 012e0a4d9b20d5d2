//! # Cluster Transport
//!
//! The sending side used by gateway nodes, plus an in-memory implementation
//! in which each registered node drains its own bounded queue.

use crate::node::NodeId;
use crate::DEFAULT_INGRESS_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors from cluster send operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No ingress queue is registered for the node, or it was dropped.
    #[error("Node {0} is unreachable")]
    NodeUnreachable(NodeId),

    /// The node's ingress queue is full.
    #[error("Ingress queue of node {0} is full")]
    QueueFull(NodeId),

    /// The payload could not be encoded by the caller.
    #[error("Failed to encode cluster message: {0}")]
    Encode(String),
}

/// A payload as received on a node's ingress queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEnvelope {
    /// Node that produced the payload.
    pub from: NodeId,
    /// Opaque encoded message.
    pub payload: Vec<u8>,
}

/// Trait for forwarding payloads to another node.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Identity of the local node.
    fn local_node(&self) -> &NodeId;

    /// Send a payload to `target`. At most once: no retry on failure.
    async fn send(&self, target: &NodeId, payload: Vec<u8>) -> Result<(), ClusterError>;
}

/// In-memory cluster shared by all nodes of a single process.
///
/// Each node calls [`InMemoryCluster::register_node`] once and keeps the
/// returned receiver as its ingress. [`InMemoryCluster::transport`] yields a
/// per-node handle implementing [`ClusterTransport`].
pub struct InMemoryCluster {
    /// Ingress senders by node.
    nodes: RwLock<HashMap<NodeId, mpsc::Sender<ClusterEnvelope>>>,

    /// Capacity of each ingress queue.
    capacity: usize,

    /// Total payloads accepted into an ingress queue.
    delivered: AtomicU64,

    /// Total payloads rejected (unknown node or full queue).
    rejected: AtomicU64,
}

impl InMemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INGRESS_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Register a node and return its ingress receiver.
    ///
    /// Registering the same node again replaces its queue; the old receiver
    /// sees the channel close.
    pub fn register_node(&self, node: NodeId) -> mpsc::Receiver<ClusterEnvelope> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Ok(mut nodes) = self.nodes.write() {
            debug!(node_id = %node, "Registered cluster node");
            nodes.insert(node, tx);
        }
        rx
    }

    /// Remove a node. Subsequent sends to it fail with `NodeUnreachable`.
    pub fn deregister_node(&self, node: &NodeId) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.remove(node);
        }
    }

    /// Transport handle that sends on behalf of `node`.
    pub fn transport(self: &Arc<Self>, node: NodeId) -> NodeTransport {
        NodeTransport {
            cluster: Arc::clone(self),
            local: node,
        }
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn deliver(&self, from: &NodeId, target: &NodeId, payload: Vec<u8>) -> Result<(), ClusterError> {
        let sender = self
            .nodes
            .read()
            .ok()
            .and_then(|nodes| nodes.get(target).cloned());

        let Some(sender) = sender else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(ClusterError::NodeUnreachable(target.clone()));
        };

        let envelope = ClusterEnvelope {
            from: from.clone(),
            payload,
        };

        match sender.try_send(envelope) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(from = %from, target = %target, "Cluster ingress queue full");
                Err(ClusterError::QueueFull(target.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ClusterError::NodeUnreachable(target.clone()))
            }
        }
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// [`ClusterTransport`] bound to one node of an [`InMemoryCluster`].
#[derive(Clone)]
pub struct NodeTransport {
    cluster: Arc<InMemoryCluster>,
    local: NodeId,
}

#[async_trait]
impl ClusterTransport for NodeTransport {
    fn local_node(&self) -> &NodeId {
        &self.local
    }

    async fn send(&self, target: &NodeId, payload: Vec<u8>) -> Result<(), ClusterError> {
        self.cluster.deliver(&self.local, target, payload)
    }
}
