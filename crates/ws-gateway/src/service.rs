//! Gateway service: wires the endpoint, subscriptions and routing together
//! and serves the WebSocket and admin routes on one listener.

use crate::adapters::{ConfigTenantProfiles, StaticTokenValidator};
use crate::domain::close::CloseStatus;
use crate::domain::commands::SubscriptionKind;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::ids::{EntityId, TenantId};
use crate::metrics::GatewayMetrics;
use crate::ports::{SubscriptionManager, UpdateSink};
use crate::routing::{PartitionAssignment, PartitionRouter, PartitionService, RouteOutcome};
use crate::subscriptions::{run_cluster_ingress, SubscriptionService};
use crate::ws::{run_supervisor, ws_routes, ConnAddrs, WsEndpoint};
use axum::{response::IntoResponse, routing::get, Json, Router};
use cluster_bus::{ClusterEnvelope, ClusterTransport, NodeId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Gateway service state
pub struct GatewayService {
    config: GatewayConfig,
    endpoint: Arc<WsEndpoint>,
    subscriptions: Arc<SubscriptionService>,
    partitions: Arc<PartitionService>,
    metrics: Arc<GatewayMetrics>,
    ingress: Mutex<Option<mpsc::Receiver<ClusterEnvelope>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl GatewayService {
    /// Create a new gateway service.
    ///
    /// `transport` sends to other nodes; `ingress` is this node's receive
    /// queue on the same cluster.
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn ClusterTransport>,
        ingress: mpsc::Receiver<ClusterEnvelope>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let metrics = Arc::new(GatewayMetrics::new());

        let node_id = NodeId::new(config.cluster.node_id.clone());
        let partitions = Arc::new(PartitionService::new(
            node_id.clone(),
            config.cluster.topic.clone(),
            config.cluster.partitions,
        ));
        let mut members: Vec<NodeId> = config
            .cluster
            .peers
            .iter()
            .map(|p| NodeId::new(p.clone()))
            .collect();
        members.push(node_id);
        partitions.update_assignment(PartitionAssignment::round_robin(
            &members,
            config.cluster.partitions,
        ));

        let router = Arc::new(PartitionRouter::new(
            Arc::clone(&partitions),
            transport,
            Arc::clone(&metrics),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(router, Arc::clone(&metrics)));

        let profiles = ConfigTenantProfiles::from_config(&config.limits)
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        let tokens = StaticTokenValidator::new(config.auth.tokens.clone());

        let endpoint = Arc::new(WsEndpoint::new(
            config.ws.clone(),
            Arc::new(tokens),
            Arc::new(profiles),
            Arc::clone(&subscriptions) as Arc<dyn SubscriptionManager>,
            Arc::clone(&metrics),
        ));
        let sink: Weak<dyn UpdateSink> = Arc::downgrade(&endpoint) as Weak<dyn UpdateSink>;
        subscriptions.bind_sink(sink);

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            endpoint,
            subscriptions,
            partitions,
            metrics,
            ingress: Mutex::new(Some(ingress)),
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Arc<WsEndpoint> {
        &self.endpoint
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionService> {
        &self.subscriptions
    }

    pub fn partitions(&self) -> &Arc<PartitionService> {
        &self.partitions
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Publish an update for an entity; routed to the partition owner.
    pub fn publish(
        &self,
        tenant_id: TenantId,
        entity_id: EntityId,
        kind: SubscriptionKind,
        data: serde_json::Value,
    ) -> RouteOutcome {
        self.subscriptions
            .publish_entity_update(tenant_id, entity_id, kind, data)
    }

    /// WebSocket routes plus `/health` and `/metrics`.
    pub fn router(&self) -> Router {
        let metrics = Arc::clone(&self.metrics);
        let endpoint = Arc::clone(&self.endpoint);
        let node_id = self.partitions.node_id().clone();

        let admin = Router::new()
            .route(
                "/health",
                get(move || {
                    let endpoint = Arc::clone(&endpoint);
                    let node_id = node_id.clone();
                    async move { health_check(&endpoint, &node_id) }
                }),
            )
            .route(
                "/metrics",
                get(move || {
                    let metrics = Arc::clone(&metrics);
                    async move { Json(metrics.to_json()) }
                }),
            );

        ws_routes(Arc::clone(&self.endpoint))
            .merge(admin)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), GatewayError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`shutdown`](Self::shutdown).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let ingress = self.ingress.lock().take().ok_or(GatewayError::AlreadyRunning)?;

        let supervisor = tokio::spawn(run_supervisor(
            Arc::clone(&self.endpoint),
            self.shutdown_tx.subscribe(),
        ));
        let cluster = tokio::spawn(run_cluster_ingress(
            Arc::clone(&self.subscriptions),
            ingress,
            self.shutdown_tx.subscribe(),
        ));

        info!(
            addr = %listener.local_addr()?,
            node_id = %self.partitions.node_id(),
            partitions = self.partitions.partitions(),
            "WebSocket gateway started"
        );

        let endpoint = Arc::clone(&self.endpoint);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<ConnAddrs>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            info!("Received shutdown signal");
            endpoint.close_all(CloseStatus::normal()).await;
        })
        .await;

        self.shutdown();
        let _ = supervisor.await;
        let _ = cluster.await;
        info!("WebSocket gateway stopped");
        result.map_err(GatewayError::from)
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

fn health_check(endpoint: &WsEndpoint, node_id: &NodeId) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ws-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "node_id": node_id.as_str(),
        "sessions": endpoint.registry().len(),
        "pending_auth": endpoint.pending().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_bus::InMemoryCluster;
    use std::time::Duration;

    fn service(config: GatewayConfig) -> Result<GatewayService, GatewayError> {
        let cluster = Arc::new(InMemoryCluster::new());
        let node = NodeId::new(config.cluster.node_id.clone());
        let ingress = cluster.register_node(node.clone());
        GatewayService::new(config, Arc::new(cluster.transport(node)), ingress)
    }

    #[test]
    fn test_config_validation() {
        let mut config = GatewayConfig::default();
        config.ws.ping_attempts = 0;
        assert!(matches!(service(config), Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_single_node_owns_every_partition() {
        let svc = service(GatewayConfig::default()).unwrap();
        let snapshot = svc.partitions().snapshot();
        assert_eq!(
            snapshot.partitions_of(svc.partitions().node_id()).len(),
            svc.config().cluster.partitions as usize
        );
        assert_eq!(
            svc.publish(
                TenantId::random(),
                EntityId::random(),
                SubscriptionKind::Timeseries,
                serde_json::json!({})
            ),
            RouteOutcome::Local
        );
    }

    #[tokio::test]
    async fn test_serve_twice_is_rejected_and_shutdown_stops() {
        let svc = Arc::new(service(GatewayConfig::default()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.serve(listener).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            svc.serve(second).await,
            Err(GatewayError::AlreadyRunning)
        ));

        svc.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
