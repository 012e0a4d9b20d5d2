//! # Partition Resolution
//!
//! Every (tenant, entity) pair hashes to exactly one partition of the core
//! topic; every partition is owned by exactly one node. The ownership
//! snapshot is replaced wholesale on reassignment and read fresh on every
//! resolution.

use crate::domain::ids::{EntityId, TenantId};
use cluster_bus::NodeId;
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Resolution result for one (tenant, entity) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionInfo {
    pub topic: String,
    pub partition: u32,
    /// Owned by the local node under the snapshot used for resolution.
    pub my_partition: bool,
}

/// Immutable ownership snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionAssignment {
    owners: HashMap<u32, NodeId>,
}

impl PartitionAssignment {
    pub fn new(owners: HashMap<u32, NodeId>) -> Self {
        Self { owners }
    }

    /// Spread `partitions` round-robin over the sorted, de-duplicated `nodes`.
    pub fn round_robin(nodes: &[NodeId], partitions: u32) -> Self {
        let mut members: Vec<NodeId> = nodes.to_vec();
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Self::default();
        }

        let owners = (0..partitions)
            .map(|p| (p, members[p as usize % members.len()].clone()))
            .collect();
        Self { owners }
    }

    pub fn owner_of(&self, partition: u32) -> Option<&NodeId> {
        self.owners.get(&partition)
    }

    pub fn partitions_of(&self, node: &NodeId) -> HashSet<u32> {
        self.owners
            .iter()
            .filter(|(_, owner)| *owner == node)
            .map(|(p, _)| *p)
            .collect()
    }
}

/// Deterministic partition of a (tenant, entity) pair.
///
/// Keccak-256 over `tenant ‖ entity`, first four bytes big-endian, modulo
/// the partition count.
pub fn partition_of(tenant_id: &TenantId, entity_id: &EntityId, partitions: u32) -> u32 {
    if partitions == 0 {
        return 0;
    }
    let mut hasher = Keccak256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(entity_id.as_bytes());
    let hash = hasher.finalize();
    let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    value % partitions
}

/// Partition service of the local node.
pub struct PartitionService {
    node_id: NodeId,
    topic: String,
    partitions: u32,
    assignment: RwLock<Arc<PartitionAssignment>>,
}

impl PartitionService {
    pub fn new(node_id: NodeId, topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            node_id,
            topic: topic.into(),
            partitions,
            assignment: RwLock::new(Arc::new(PartitionAssignment::default())),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<PartitionAssignment> {
        Arc::clone(&*self.assignment.read())
    }

    /// Replace the ownership snapshot.
    pub fn update_assignment(&self, assignment: PartitionAssignment) {
        let mine = assignment.partitions_of(&self.node_id).len();
        *self.assignment.write() = Arc::new(assignment);
        info!(
            node_id = %self.node_id,
            topic = %self.topic,
            my_partitions = mine,
            total = self.partitions,
            "Partition assignment updated"
        );
    }

    pub fn resolve(&self, tenant_id: &TenantId, entity_id: &EntityId) -> TopicPartitionInfo {
        self.resolve_owner(tenant_id, entity_id).0
    }

    /// Resolve the pair and its owner against one snapshot, so
    /// `my_partition` and the owner always agree.
    pub fn resolve_owner(
        &self,
        tenant_id: &TenantId,
        entity_id: &EntityId,
    ) -> (TopicPartitionInfo, Option<NodeId>) {
        let partition = partition_of(tenant_id, entity_id, self.partitions);
        let owner = self.snapshot().owner_of(partition).cloned();
        let info = TopicPartitionInfo {
            topic: self.topic.clone(),
            partition,
            my_partition: owner.as_ref() == Some(&self.node_id),
        };
        (info, owner)
    }
}
