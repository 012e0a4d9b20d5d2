//! # Test Harness
//!
//! Gateway nodes bound to ephemeral ports on a shared in-memory cluster,
//! plus socket client helpers.

use async_trait::async_trait;
use cluster_bus::{InMemoryCluster, NodeId};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use ws_gateway::domain::config::TokenGrant;
use ws_gateway::domain::{CustomerId, TenantId, UserId};
use ws_gateway::ports::TransportSession;
use ws_gateway::{CloseStatus, GatewayConfig, GatewayError, GatewayService, TransportError};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default wait for a frame the test expects to arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// GATEWAY NODES
// =============================================================================

/// One running gateway node. Shuts down when dropped.
pub struct TestNode {
    pub service: Arc<GatewayService>,
    pub addr: SocketAddr,
    task: JoinHandle<Result<(), GatewayError>>,
}

impl TestNode {
    pub fn ws_url(&self, path: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}{}?token={}", self.addr, path, token),
            None => format!("ws://{}{}", self.addr, path),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn sessions(&self) -> usize {
        self.service.endpoint().registry().len()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

/// Configuration with short timers suitable for tests.
pub fn test_config(node_id: &str, peers: &[&str], tokens: Vec<TokenGrant>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.port = 0;
    config.ws.auth_timeout = Duration::from_millis(300);
    config.ws.auth_sweep_interval = Duration::from_millis(50);
    config.ws.send_timeout = Duration::from_secs(2);
    config.cluster.node_id = node_id.to_string();
    config.cluster.peers = peers.iter().map(|p| p.to_string()).collect();
    config.auth.tokens = tokens;
    config
}

/// Start a node on `cluster` listening on an ephemeral port.
pub async fn spawn_node(cluster: &Arc<InMemoryCluster>, config: GatewayConfig) -> TestNode {
    let node_id = NodeId::new(config.cluster.node_id.clone());
    let ingress = cluster.register_node(node_id.clone());
    let service = Arc::new(
        GatewayService::new(config, Arc::new(cluster.transport(node_id)), ingress)
            .expect("test config is valid"),
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener address");
    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.serve(listener).await })
    };

    TestNode {
        service,
        addr,
        task,
    }
}

/// Token for a regular customer user of `tenant_id`.
pub fn user_grant(token: &str, tenant_id: TenantId) -> TokenGrant {
    TokenGrant {
        token: token.to_string(),
        tenant_id,
        customer_id: Some(CustomerId::random()),
        user_id: UserId::random(),
        public: false,
    }
}

// =============================================================================
// SOCKET CLIENT
// =============================================================================

pub async fn connect(url: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket handshake");
    ws
}

pub async fn send_json(ws: &mut Client, frame: serde_json::Value) {
    ws.send(Message::text(frame.to_string()))
        .await
        .expect("send frame");
}

/// Next text frame as JSON. `None` on timeout or close.
pub async fn next_json(ws: &mut Client, wait: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Wait for the server's close frame; returns (code, reason).
pub async fn next_close(ws: &mut Client, wait: Duration) -> Option<(u16, String)> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame.ok()? {
            Message::Close(Some(frame)) => {
                return Some((u16::from(frame.code), frame.reason.as_str().to_string()))
            }
            Message::Close(None) => return None,
            _ => continue,
        }
    }
}

/// Poll `condition` until it holds or `wait` elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// =============================================================================
// TRANSPORTS
// =============================================================================

/// Transport whose text writes never complete. Records close frames.
#[derive(Default)]
pub struct StalledTransport {
    closes: Mutex<Vec<CloseStatus>>,
}

impl StalledTransport {
    pub fn closes(&self) -> Vec<CloseStatus> {
        self.closes.lock().clone()
    }
}

#[async_trait]
impl TransportSession for StalledTransport {
    async fn send_text(&self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self, status: CloseStatus) {
        self.closes.lock().push(status);
    }
}
