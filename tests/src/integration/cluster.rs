//! # Cluster Routing Tests
//!
//! Two gateway nodes on one in-memory cluster bus. A client connected to
//! node A subscribes to an entity whose partition belongs to node B; the
//! subscription lives on B and updates travel back to A.

#[cfg(test)]
mod tests {
    use super::super::harness::*;
    use cluster_bus::InMemoryCluster;
    use serde_json::json;
    use std::sync::Arc;
    use ws_gateway::domain::{EntityId, TenantId};
    use ws_gateway::{RouteOutcome, SubscriptionKind};

    struct Pair {
        a: TestNode,
        b: TestNode,
        tenant_id: TenantId,
    }

    async fn two_nodes() -> Pair {
        let tenant_id = TenantId::random();
        let cluster = Arc::new(InMemoryCluster::new());
        let tokens = vec![user_grant("alice", tenant_id)];

        let a = spawn_node(&cluster, test_config("node-a", &["node-b"], tokens.clone())).await;
        let b = spawn_node(&cluster, test_config("node-b", &["node-a"], tokens)).await;
        Pair { a, b, tenant_id }
    }

    /// Entity whose partition is owned by `owner` rather than `other`.
    fn entity_owned_by(owner: &TestNode, other: &TestNode, tenant_id: &TenantId) -> EntityId {
        loop {
            let entity = EntityId::random();
            let on_owner = owner.service.partitions().resolve(tenant_id, &entity);
            let on_other = other.service.partitions().resolve(tenant_id, &entity);
            if on_owner.my_partition && !on_other.my_partition {
                return entity;
            }
        }
    }

    #[tokio::test]
    async fn test_nodes_agree_on_ownership() {
        let pair = two_nodes().await;
        for _ in 0..32 {
            let entity = EntityId::random();
            let a = pair.a.service.partitions().resolve(&pair.tenant_id, &entity);
            let b = pair.b.service.partitions().resolve(&pair.tenant_id, &entity);
            assert_eq!(a.partition, b.partition);
            assert_ne!(a.my_partition, b.my_partition);
        }
    }

    #[tokio::test]
    async fn test_cross_node_subscription_and_delivery() {
        let pair = two_nodes().await;
        let entity = entity_owned_by(&pair.b, &pair.a, &pair.tenant_id);

        let mut ws = connect(&pair.a.ws_url("/api/ws", Some("alice"))).await;
        send_json(
            &mut ws,
            json!({"cmds": [{
                "type": "TIMESERIES",
                "cmdId": 11,
                "entityType": "DEVICE",
                "entityId": entity.to_string(),
            }]}),
        )
        .await;

        let owner = Arc::clone(pair.b.service.subscriptions());
        assert!(wait_until(|| owner.owned_subscriptions() == 1, RECV_TIMEOUT).await);
        assert_eq!(pair.a.service.subscriptions().owned_subscriptions(), 0);

        // Published on the session's node: forwarded to the owner, then back
        let outcome = pair.a.service.publish(
            pair.tenant_id,
            entity,
            SubscriptionKind::Timeseries,
            json!({"speed": 88}),
        );
        assert_eq!(outcome, RouteOutcome::Forwarded("node-b".into()));

        let update = next_json(&mut ws, RECV_TIMEOUT).await.expect("update frame");
        assert_eq!(update, json!({"cmdId": 11, "errorCode": 0, "data": {"speed": 88}}));

        // Published on the owner directly
        assert_eq!(
            pair.b.service.publish(
                pair.tenant_id,
                entity,
                SubscriptionKind::Timeseries,
                json!({"speed": 89}),
            ),
            RouteOutcome::Local
        );
        let update = next_json(&mut ws, RECV_TIMEOUT).await.expect("update frame");
        assert_eq!(update["data"]["speed"], 89);

        let metrics = pair.a.service.metrics().to_json();
        assert!(metrics["cluster"]["forwards"].as_u64().unwrap_or(0) >= 2);
    }

    #[tokio::test]
    async fn test_session_close_cancels_remote_subscriptions() {
        let pair = two_nodes().await;
        let entity = entity_owned_by(&pair.b, &pair.a, &pair.tenant_id);

        let mut ws = connect(&pair.a.ws_url("/api/ws", Some("alice"))).await;
        send_json(
            &mut ws,
            json!({"cmds": [{
                "type": "ATTRIBUTES",
                "cmdId": 2,
                "entityType": "ASSET",
                "entityId": entity.to_string(),
            }]}),
        )
        .await;

        let owner = Arc::clone(pair.b.service.subscriptions());
        assert!(wait_until(|| owner.owned_subscriptions() == 1, RECV_TIMEOUT).await);

        ws.close(None).await.expect("client close");
        assert!(wait_until(|| owner.owned_subscriptions() == 0, RECV_TIMEOUT).await);
        assert!(wait_until(|| pair.a.sessions() == 0, RECV_TIMEOUT).await);
    }
}
