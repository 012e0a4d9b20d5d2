//! Ports (hexagonal boundaries) of the gateway.
//!
//! - `outbound`: what the gateway needs from its surroundings (socket,
//!   subscription management, token validation, tenant profiles)
//! - `inbound`: what the gateway offers to update producers

pub mod inbound;
pub mod outbound;

pub use inbound::UpdateSink;
pub use outbound::{SubscriptionManager, TenantProfileProvider, TokenValidator, TransportSession};
