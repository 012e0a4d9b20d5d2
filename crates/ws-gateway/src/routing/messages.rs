//! Messages exchanged between gateway nodes.

use crate::domain::commands::SubscriptionKind;
use crate::domain::ids::{EntityId, ExternalSessionId, TenantId};
use crate::domain::update::CmdUpdate;
use cluster_bus::{ClusterError, NodeId};
use serde::{Deserialize, Serialize};

/// A subscription as held by the partition owner of its entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub session_id: ExternalSessionId,
    /// Node holding the client connection.
    pub node_id: NodeId,
    pub tenant_id: TenantId,
    pub entity_id: EntityId,
    pub cmd_id: i32,
    pub kind: SubscriptionKind,
    /// Key filter; `None` means every key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscriptionRecord {
    /// Apply the key filter to an object payload.
    pub fn filter_data(&self, data: &serde_json::Value) -> Option<serde_json::Value> {
        let Some(keys) = &self.keys else {
            return Some(data.clone());
        };
        let serde_json::Value::Object(map) = data else {
            return Some(data.clone());
        };
        let filtered: serde_json::Map<_, _> = map
            .iter()
            .filter(|(k, _)| keys.iter().any(|key| key == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if filtered.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(filtered))
        }
    }
}

/// Cluster message, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterMessage {
    /// Register a subscription with the partition owner.
    AddSubscription(SubscriptionRecord),
    /// Remove one subscription from the partition owner.
    CancelSubscription {
        session_id: ExternalSessionId,
        tenant_id: TenantId,
        entity_id: EntityId,
        cmd_id: i32,
    },
    /// Update produced on a node that does not own the entity's partition.
    EntityUpdate {
        tenant_id: TenantId,
        entity_id: EntityId,
        kind: SubscriptionKind,
        data: serde_json::Value,
    },
    /// Update for a session connected to the receiving node.
    SessionUpdate {
        session_id: ExternalSessionId,
        update: CmdUpdate,
    },
}

impl ClusterMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ClusterError> {
        serde_json::to_vec(self).map_err(|e| ClusterError::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddSubscription(_) => "add_subscription",
            Self::CancelSubscription { .. } => "cancel_subscription",
            Self::EntityUpdate { .. } => "entity_update",
            Self::SessionUpdate { .. } => "session_update",
        }
    }
}
