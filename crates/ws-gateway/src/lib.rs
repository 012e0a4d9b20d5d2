#![allow(missing_docs)]

//! WebSocket delivery gateway for real-time IoT updates.
//!
//! Clients open a socket, authenticate (inline token or a first `authCmd`
//! frame), send subscription commands and receive pushed updates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         WS GATEWAY (one node)                         │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  /api/ws   /api/ws/plugins/:kind          /health   /metrics          │
//! │      │                                                                │
//! │  ┌───┴──────────────┐   auth    ┌──────────────────┐                  │
//! │  │ PendingAuthCache │ ───────▶  │  SessionRegistry │                  │
//! │  │  (auth timeout)  │           │ + SessionLimiter │                  │
//! │  └──────────────────┘           └────────┬─────────┘                  │
//! │                                          │                            │
//! │   inbound drain ──▶ SubscriptionService ◀┴── outbound dispatcher       │
//! │   (serialized)         │                     (single flight, bounded) │
//! │                        ▼                                              │
//! │                 PartitionRouter ── local ──▶ EntitySubscriptions      │
//! └────────────────────────┼─────────────────────────────────────────────┘
//!                          │ remote
//!                    cluster-bus ───▶ owning node
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ws_gateway::{GatewayConfig, GatewayService};
//!
//! let service = GatewayService::new(GatewayConfig::default(), transport, ingress)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod executor;
pub mod limits;
pub mod metrics;
pub mod ports;
pub mod routing;
pub mod service;
pub mod subscriptions;
pub mod ws;

// Re-exports for public API
pub use domain::config::GatewayConfig;
pub use domain::error::{GatewayError, SendError, TransportError};
pub use domain::update::CmdUpdate;
pub use domain::{CloseStatus, SessionType, SubscriptionKind};
pub use metrics::GatewayMetrics;
pub use routing::RouteOutcome;
pub use service::GatewayService;
pub use ws::WsEndpoint;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
