//! Domain types for the gateway.
//!
//! Identifiers, session identity, command envelopes, outbound payloads,
//! configuration and errors. No I/O lives here.

pub mod close;
pub mod commands;
pub mod config;
pub mod error;
pub mod ids;
pub mod session;
pub mod update;

// Re-exports for convenience
pub use close::CloseStatus;
pub use commands::{AuthCmd, CommandEnvelope, SubscriptionKind, WsCmd};
pub use config::{GatewayConfig, TenantProfileConfig};
pub use error::{AuthError, DecodeError, GatewayError, SendError, TransportError};
pub use ids::{ConnectionId, CustomerId, EntityId, ExternalSessionId, TenantId, UserId};
pub use session::{SecurityCtx, SessionRef, SessionType, UserPrincipalKind};
pub use update::CmdUpdate;
