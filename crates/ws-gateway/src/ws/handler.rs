//! axum WebSocket routes.
//!
//! `/api/ws` serves the general envelope, `/api/ws/plugins/{telemetry,
//! notifications}` the legacy ones. A `?token=` query parameter is checked
//! before the upgrade; without it the session waits for an `authCmd`.

use crate::domain::close::CloseStatus;
use crate::domain::error::TransportError;
use crate::domain::ids::ConnectionId;
use crate::domain::session::{SecurityCtx, SessionType};
use crate::ports::TransportSession;
use crate::ws::endpoint::WsEndpoint;
use async_trait::async_trait;
use axum::{
    extract::{
        connect_info::Connected,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    serve::IncomingStream,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// Both ends of an accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAddrs {
    pub local: Option<SocketAddr>,
    pub remote: SocketAddr,
}

impl Connected<IncomingStream<'_>> for ConnAddrs {
    fn connect_info(target: IncomingStream<'_>) -> Self {
        Self {
            local: target.local_addr().ok(),
            remote: target.remote_addr(),
        }
    }
}

/// WebSocket routes bound to `endpoint`.
///
/// Serve with `into_make_service_with_connect_info::<ConnAddrs>()` to record
/// socket addresses on sessions.
pub fn ws_routes(endpoint: Arc<WsEndpoint>) -> Router {
    Router::new()
        .route("/api/ws", get(general_upgrade))
        .route("/api/ws/plugins/:kind", get(plugin_upgrade))
        .with_state(endpoint)
}

async fn general_upgrade(
    State(endpoint): State<Arc<WsEndpoint>>,
    addrs: Option<ConnectInfo<ConnAddrs>>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(endpoint, SessionType::General, query, addrs.map(|c| c.0), ws)
}

async fn plugin_upgrade(
    State(endpoint): State<Arc<WsEndpoint>>,
    Path(kind): Path<String>,
    addrs: Option<ConnectInfo<ConnAddrs>>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(session_type) = SessionType::from_plugin_suffix(&kind) else {
        debug!(kind = %kind, "Unknown websocket plugin");
        return (StatusCode::NOT_FOUND, "Unknown websocket endpoint").into_response();
    };
    upgrade(endpoint, session_type, query, addrs.map(|c| c.0), ws)
}

fn upgrade(
    endpoint: Arc<WsEndpoint>,
    session_type: SessionType,
    query: HandshakeQuery,
    addrs: Option<ConnAddrs>,
    ws: WebSocketUpgrade,
) -> Response {
    let security = match query.token.as_deref() {
        Some(token) => match endpoint.validate_token(token) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!(remote = ?addrs.map(|a| a.remote), error = %e, "Handshake token rejected");
                endpoint.metrics().record_auth_failure();
                return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
            }
        },
        None => None,
    };

    let max_message_size = endpoint.config().max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| serve_socket(endpoint, session_type, security, addrs, socket))
}

async fn serve_socket(
    endpoint: Arc<WsEndpoint>,
    session_type: SessionType,
    security: Option<SecurityCtx>,
    addrs: Option<ConnAddrs>,
    socket: WebSocket,
) {
    let conn_id = ConnectionId::new();
    let (sink, mut stream) = socket.split();
    let (closed_tx, mut closed_rx) = watch::channel(false);
    let transport = Arc::new(AxumTransport {
        sink: Mutex::new(sink),
        closed: closed_tx,
    });

    if endpoint
        .on_connected(
            conn_id,
            session_type,
            transport,
            security,
            addrs.and_then(|a| a.local),
            addrs.map(|a| a.remote),
        )
        .await
        .is_none()
    {
        return;
    }

    loop {
        tokio::select! {
            _ = closed_rx.changed() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => endpoint.on_message(conn_id, text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => endpoint.on_message(conn_id, text),
                    Err(_) => debug!(conn_id = %conn_id, "Dropped non UTF-8 binary frame"),
                },
                Some(Ok(Message::Pong(_))) => endpoint.on_pong(conn_id),
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "Websocket read error");
                    break;
                }
            }
        }
    }

    endpoint.on_closed(conn_id).await;
}

/// Write half of an axum socket.
struct AxumTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    /// Flipped on close so the reader loop stops.
    closed: watch::Sender<bool>,
}

impl AxumTransport {
    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait]
impl TransportSession for AxumTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.write(Message::Text(text)).await
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        self.write(Message::Ping(Vec::new())).await
    }

    async fn close(&self, status: CloseStatus) {
        self.closed.send_replace(true);
        let frame = CloseFrame {
            code: status.code,
            reason: status.reason,
        };
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not delivered");
        }
        let _ = sink.close().await;
    }
}
