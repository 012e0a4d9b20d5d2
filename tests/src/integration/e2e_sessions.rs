//! # End-to-End Session Tests
//!
//! Real sockets against a single gateway node:
//!
//! 1. **Inline auth**: token on the handshake, subscribe, publish, one frame
//! 2. **Deferred auth**: `authCmd` in the first frame, then subscriptions
//! 3. **Auth timeout**: no first frame, policy close
//! 4. **Backpressure**: a stalled consumer overflows its queue and is closed
//! 5. **Limits**: tenant session cap refuses the extra session

#[cfg(test)]
mod tests {
    use super::super::harness::*;
    use cluster_bus::InMemoryCluster;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite;
    use ws_gateway::domain::close::codes;
    use ws_gateway::domain::{ConnectionId, EntityId, SecurityCtx, TenantId, UserPrincipalKind};
    use ws_gateway::ws::{Outbound, AUTH_TIMEOUT_REASON, QUEUE_OVERFLOW_REASON};
    use ws_gateway::{SendError, SessionType, SubscriptionKind};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Fixture {
        node: TestNode,
        tenant_id: TenantId,
    }

    async fn single_node() -> Fixture {
        single_node_with(|_| {}).await
    }

    async fn single_node_with<F: FnOnce(&mut ws_gateway::GatewayConfig)>(tweak: F) -> Fixture {
        let tenant_id = TenantId::random();
        let mut config = test_config(
            "node-a",
            &[],
            vec![user_grant("alice", tenant_id), user_grant("bob", tenant_id)],
        );
        tweak(&mut config);
        let cluster = Arc::new(InMemoryCluster::new());
        Fixture {
            node: spawn_node(&cluster, config).await,
            tenant_id,
        }
    }

    fn ts_subscribe(cmd_id: i32, entity_id: EntityId) -> serde_json::Value {
        json!({
            "cmds": [{
                "type": "TIMESERIES",
                "cmdId": cmd_id,
                "entityType": "DEVICE",
                "entityId": entity_id.to_string(),
            }]
        })
    }

    async fn wait_for_subscriptions(node: &TestNode, count: usize) {
        let subscriptions = Arc::clone(node.service.subscriptions());
        assert!(
            wait_until(|| subscriptions.owned_subscriptions() == count, RECV_TIMEOUT).await,
            "expected {count} subscriptions"
        );
    }

    // =============================================================================
    // AUTHENTICATION FLOWS
    // =============================================================================

    /// Inline token, subscribe, one publish produces exactly one frame
    #[tokio::test]
    async fn test_inline_auth_subscribe_and_receive_once() {
        let fx = single_node().await;
        let entity = EntityId::random();

        let mut ws = connect(&fx.node.ws_url("/api/ws", Some("alice"))).await;
        send_json(&mut ws, ts_subscribe(1, entity)).await;
        wait_for_subscriptions(&fx.node, 1).await;

        fx.node.service.publish(
            fx.tenant_id,
            entity,
            SubscriptionKind::Timeseries,
            json!({"temperature": 21.5}),
        );

        let frame = next_json(&mut ws, RECV_TIMEOUT).await.expect("update frame");
        assert_eq!(
            frame,
            json!({"cmdId": 1, "errorCode": 0, "data": {"temperature": 21.5}})
        );
        assert!(next_json(&mut ws, Duration::from_millis(200)).await.is_none());
    }

    /// Sessions record both ends of the socket
    #[tokio::test]
    async fn test_session_records_socket_addresses() {
        let fx = single_node().await;
        let _ws = connect(&fx.node.ws_url("/api/ws", Some("alice"))).await;
        assert!(wait_until(|| fx.node.sessions() == 1, RECV_TIMEOUT).await);

        let sessions = fx.node.service.endpoint().registry().sessions();
        let session = sessions[0].session();
        assert_eq!(session.local_addr(), Some(fx.node.addr));
        let remote = session.remote_addr().expect("remote address");
        assert!(remote.ip().is_loopback());
        assert_ne!(remote.port(), fx.node.addr.port());
    }

    /// First frame carries authCmd plus a subscription
    #[tokio::test]
    async fn test_deferred_auth_then_subscribe() {
        let fx = single_node().await;
        let entity = EntityId::random();

        let mut ws = connect(&fx.node.ws_url("/api/ws", None)).await;
        assert!(
            wait_until(|| fx.node.service.endpoint().pending().len() == 1, RECV_TIMEOUT).await
        );

        let mut frame = ts_subscribe(7, entity);
        frame["authCmd"] = json!({"cmdId": 0, "token": "bob"});
        send_json(&mut ws, frame).await;

        wait_for_subscriptions(&fx.node, 1).await;
        assert_eq!(fx.node.sessions(), 1);
        assert!(fx.node.service.endpoint().pending().is_empty());

        fx.node.service.publish(
            fx.tenant_id,
            entity,
            SubscriptionKind::Timeseries,
            json!({"humidity": 40}),
        );
        let update = next_json(&mut ws, RECV_TIMEOUT).await.expect("update frame");
        assert_eq!(update["cmdId"], 7);
        assert_eq!(update["data"]["humidity"], 40);
    }

    /// No auth frame within the timeout closes with a policy violation
    #[tokio::test]
    async fn test_auth_timeout_closes_pending_session() {
        let fx = single_node().await;

        let mut ws = connect(&fx.node.ws_url("/api/ws", None)).await;
        let (code, reason) = next_close(&mut ws, RECV_TIMEOUT).await.expect("close frame");

        assert_eq!(code, codes::POLICY_VIOLATION);
        assert_eq!(reason, AUTH_TIMEOUT_REASON);
        assert!(
            wait_until(|| fx.node.service.endpoint().pending().is_empty(), RECV_TIMEOUT).await
        );
        assert_eq!(fx.node.sessions(), 0);
    }

    #[tokio::test]
    async fn test_first_frame_without_auth_is_rejected() {
        let fx = single_node().await;

        let mut ws = connect(&fx.node.ws_url("/api/ws", None)).await;
        send_json(&mut ws, ts_subscribe(1, EntityId::random())).await;

        let (code, reason) = next_close(&mut ws, RECV_TIMEOUT).await.expect("close frame");
        assert_eq!(code, codes::POLICY_VIOLATION);
        assert_eq!(reason, "Auth cmd is missing");
    }

    #[tokio::test]
    async fn test_deferred_invalid_token_is_bad_data() {
        let fx = single_node().await;

        let mut ws = connect(&fx.node.ws_url("/api/ws", None)).await;
        send_json(&mut ws, json!({"authCmd": {"cmdId": 0, "token": "mallory"}})).await;

        let (code, reason) = next_close(&mut ws, RECV_TIMEOUT).await.expect("close frame");
        assert_eq!(code, codes::BAD_DATA);
        assert_eq!(reason, "Invalid token");
    }

    #[tokio::test]
    async fn test_inline_invalid_token_rejects_handshake() {
        let fx = single_node().await;

        let result = tokio_tungstenite::connect_async(fx.node.ws_url("/api/ws", Some("mallory"))).await;
        match result.map(|_| ()) {
            Ok(()) => panic!("handshake must fail"),
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            fx.node.service.metrics().to_json()["sessions"]["auth_failures"],
            1
        );
    }

    // =============================================================================
    // WIRE SHAPES
    // =============================================================================

    #[tokio::test]
    async fn test_legacy_telemetry_endpoint() {
        let fx = single_node().await;
        let entity = EntityId::random();

        let mut ws = connect(&fx.node.ws_url("/api/ws/plugins/telemetry", Some("alice"))).await;
        send_json(
            &mut ws,
            json!({"tsSubCmds": [{
                "cmdId": 3,
                "entityType": "DEVICE",
                "entityId": entity.to_string(),
                "keys": "temperature",
            }]}),
        )
        .await;
        wait_for_subscriptions(&fx.node, 1).await;

        fx.node.service.publish(
            fx.tenant_id,
            entity,
            SubscriptionKind::Timeseries,
            json!({"temperature": 20, "voltage": 3.3}),
        );
        let update = next_json(&mut ws, RECV_TIMEOUT).await.expect("update frame");
        assert_eq!(
            update,
            json!({"subscriptionId": 3, "errorCode": 0, "data": {"temperature": 20}})
        );
    }

    #[tokio::test]
    async fn test_garbage_after_auth_gets_in_band_error() {
        let fx = single_node().await;

        let mut ws = connect(&fx.node.ws_url("/api/ws", Some("alice"))).await;
        ws_send_raw(&mut ws, "not json").await;

        let reply = next_json(&mut ws, RECV_TIMEOUT).await.expect("error frame");
        assert_eq!(reply["errorCode"], 2);
        assert_eq!(fx.node.sessions(), 1);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_not_found() {
        let fx = single_node().await;

        let result = tokio_tungstenite::connect_async(fx.node.ws_url("/api/ws/plugins/video", None)).await;
        match result.map(|_| ()) {
            Ok(()) => panic!("handshake must fail"),
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 404),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    async fn ws_send_raw(ws: &mut Client, text: &str) {
        use futures::SinkExt;
        ws.send(tungstenite::Message::text(text.to_string()))
            .await
            .expect("send frame");
    }

    // =============================================================================
    // BACKPRESSURE
    // =============================================================================

    /// 1001 updates against a consumer that never drains its first write
    #[tokio::test]
    async fn test_stalled_consumer_overflows_and_is_closed() {
        let fx = single_node_with(|config| {
            config.ws.send_timeout = Duration::from_secs(30);
        })
        .await;
        let endpoint = Arc::clone(fx.node.service.endpoint());
        let transport = Arc::new(StalledTransport::default());

        let state = endpoint
            .on_connected(
                ConnectionId::new(),
                SessionType::General,
                transport.clone(),
                Some(SecurityCtx {
                    tenant_id: fx.tenant_id,
                    customer_id: None,
                    user_id: ws_gateway::domain::UserId::random(),
                    principal: UserPrincipalKind::UserName,
                }),
                None,
                None,
            )
            .await
            .expect("session established");
        assert_eq!(state.max_queue(), 1000);

        let dispatcher = endpoint.dispatcher().clone();
        for i in 0..1000 {
            assert!(
                dispatcher.send(&state, Outbound::Text(format!("{{\"n\":{i}}}"))).is_ok(),
                "message {i} should be accepted"
            );
        }
        assert_eq!(
            dispatcher.send(&state, Outbound::Text("{\"n\":1000}".into())),
            Err(SendError::QueueOverflow)
        );

        assert!(wait_until(|| !transport.closes().is_empty(), RECV_TIMEOUT).await);
        let closes = transport.closes();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].code, codes::POLICY_VIOLATION);
        assert_eq!(closes[0].reason, QUEUE_OVERFLOW_REASON);
        assert_eq!(
            dispatcher.send(&state, Outbound::Text("late".into())),
            Err(SendError::Closed)
        );
    }

    // =============================================================================
    // LIMITS
    // =============================================================================

    #[tokio::test]
    async fn test_tenant_cap_refuses_extra_session() {
        let fx = single_node_with(|config| {
            config.limits.default_profile.max_sessions_per_tenant = 1;
        })
        .await;

        let mut first = connect(&fx.node.ws_url("/api/ws", Some("alice"))).await;
        assert!(wait_until(|| fx.node.sessions() == 1, RECV_TIMEOUT).await);

        let mut second = connect(&fx.node.ws_url("/api/ws", Some("bob"))).await;
        let (code, reason) = next_close(&mut second, RECV_TIMEOUT)
            .await
            .expect("close frame");
        assert_eq!(code, codes::POLICY_VIOLATION);
        assert_eq!(reason, "Max tenant sessions limit reached!");
        assert_eq!(fx.node.sessions(), 1);

        // Slot is released when the first session goes away
        first.close(None).await.expect("client close");
        assert!(wait_until(|| fx.node.sessions() == 0, RECV_TIMEOUT).await);

        let _third = connect(&fx.node.ws_url("/api/ws", Some("bob"))).await;
        assert!(wait_until(|| fx.node.sessions() == 1, RECV_TIMEOUT).await);
    }

    // =============================================================================
    // ADMIN ENDPOINTS
    // =============================================================================

    #[tokio::test]
    async fn test_health_and_metrics() {
        let fx = single_node().await;
        let _ws = connect(&fx.node.ws_url("/api/ws", Some("alice"))).await;
        assert!(wait_until(|| fx.node.sessions() == 1, RECV_TIMEOUT).await);

        let health: serde_json::Value = reqwest::get(fx.node.http_url("/health"))
            .await
            .expect("health request")
            .json()
            .await
            .expect("health body");
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "ws-gateway");
        assert_eq!(health["node_id"], "node-a");
        assert_eq!(health["sessions"], 1);

        let metrics: serde_json::Value = reqwest::get(fx.node.http_url("/metrics"))
            .await
            .expect("metrics request")
            .json()
            .await
            .expect("metrics body");
        assert_eq!(metrics["sessions"]["established"], 1);
        assert!(fx.node.is_running());
    }
}
