//! Subscriptions held by the partition owner, indexed by entity.

use crate::domain::commands::SubscriptionKind;
use crate::domain::ids::{EntityId, ExternalSessionId};
use crate::routing::messages::SubscriptionRecord;
use dashmap::DashMap;

#[derive(Default)]
pub struct EntitySubscriptions {
    by_entity: DashMap<EntityId, Vec<SubscriptionRecord>>,
}

impl EntitySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing one with the same session and command id.
    pub fn add(&self, record: SubscriptionRecord) {
        let mut records = self.by_entity.entry(record.entity_id).or_default();
        records.retain(|r| !(r.session_id == record.session_id && r.cmd_id == record.cmd_id));
        records.push(record);
    }

    /// Remove one record. Returns `true` if it existed.
    pub fn cancel(&self, session_id: &ExternalSessionId, entity_id: &EntityId, cmd_id: i32) -> bool {
        let removed = match self.by_entity.get_mut(entity_id) {
            Some(mut records) => {
                let before = records.len();
                records.retain(|r| !(r.session_id == *session_id && r.cmd_id == cmd_id));
                records.len() != before
            }
            None => false,
        };
        self.by_entity.remove_if(entity_id, |_, records| records.is_empty());
        removed
    }

    /// Records on `entity_id` listening to `kind`.
    pub fn matching(&self, entity_id: &EntityId, kind: SubscriptionKind) -> Vec<SubscriptionRecord> {
        self.by_entity
            .get(entity_id)
            .map(|records| records.iter().filter(|r| r.kind == kind).cloned().collect())
            .unwrap_or_default()
    }

    /// Total records.
    pub fn len(&self) -> usize {
        self.by_entity.iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::TenantId;
    use cluster_bus::NodeId;

    fn record(session: &str, entity: EntityId, cmd_id: i32, kind: SubscriptionKind) -> SubscriptionRecord {
        SubscriptionRecord {
            session_id: ExternalSessionId::from(session),
            node_id: NodeId::from("a"),
            tenant_id: TenantId::random(),
            entity_id: entity,
            cmd_id,
            kind,
            keys: None,
        }
    }

    #[test]
    fn test_same_cmd_id_replaces() {
        let subs = EntitySubscriptions::new();
        let entity = EntityId::random();
        subs.add(record("s", entity, 1, SubscriptionKind::Timeseries));
        subs.add(record("s", entity, 1, SubscriptionKind::Attributes));

        assert_eq!(subs.len(), 1);
        assert!(subs.matching(&entity, SubscriptionKind::Timeseries).is_empty());
        assert_eq!(subs.matching(&entity, SubscriptionKind::Attributes).len(), 1);
    }

    #[test]
    fn test_cancel_removes_empty_entity() {
        let subs = EntitySubscriptions::new();
        let entity = EntityId::random();
        subs.add(record("s", entity, 1, SubscriptionKind::Timeseries));
        subs.add(record("t", entity, 1, SubscriptionKind::Timeseries));

        assert!(subs.cancel(&ExternalSessionId::from("s"), &entity, 1));
        assert!(!subs.cancel(&ExternalSessionId::from("s"), &entity, 1));
        assert_eq!(subs.len(), 1);

        assert!(subs.cancel(&ExternalSessionId::from("t"), &entity, 1));
        assert!(subs.is_empty());
    }
}
