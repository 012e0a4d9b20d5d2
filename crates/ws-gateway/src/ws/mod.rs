//! WebSocket session handling.
//!
//! - `endpoint`: lifecycle glue (connect, auth, frames, teardown)
//! - `outbound` / `inbound`: per-session send loop and command drain
//! - `registry` / `pending`: live and not-yet-authenticated sessions
//! - `liveness`: ping and auth-timeout supervisor
//! - `handler`: axum routes and the socket transport

pub mod endpoint;
pub mod handler;
pub mod inbound;
pub mod liveness;
pub mod outbound;
pub mod pending;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use endpoint::{WsEndpoint, AUTH_TIMEOUT_REASON};
pub use handler::{ws_routes, ConnAddrs};
pub use liveness::run_supervisor;
pub use outbound::{Outbound, OutboundDispatcher, QUEUE_OVERFLOW_REASON};
pub use pending::PendingAuthCache;
pub use registry::SessionRegistry;
pub use session::SessionState;
