//! # Cluster Bus - Inter-Node Transport
//!
//! Carries opaque payloads from one gateway node to another. Every node owns
//! a bounded ingress queue; senders address a node by its [`NodeId`].
//!
//! ```text
//! ┌──────────────┐                      ┌──────────────┐
//! │   Node A     │   send(node_b, ..)   │   Node B     │
//! │              │ ──────┐              │              │
//! └──────────────┘       │              └──────────────┘
//!                        ▼                     ↑
//!                 ┌──────────────┐             │
//!                 │ ClusterBus   │  ingress rx │
//!                 │ (per node Q) │ ────────────┘
//!                 └──────────────┘
//! ```
//!
//! Delivery is at-most-once: a full or missing ingress queue is reported to
//! the sender and the payload is dropped.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod node;
pub mod transport;

pub use node::NodeId;
pub use transport::{ClusterEnvelope, ClusterError, ClusterTransport, InMemoryCluster, NodeTransport};

/// Maximum payloads buffered per node before senders see `QueueFull`.
pub const DEFAULT_INGRESS_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_INGRESS_CAPACITY, 1000);
    }
}
