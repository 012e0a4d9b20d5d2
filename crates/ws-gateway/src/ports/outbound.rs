//! Outbound ports for the gateway.

use crate::domain::close::CloseStatus;
use crate::domain::commands::WsCmd;
use crate::domain::error::{AuthError, TransportError};
use crate::domain::ids::TenantId;
use crate::domain::session::{SecurityCtx, SessionRef};
use crate::limits::TenantProfile;
use async_trait::async_trait;
use std::sync::Arc;

/// One client connection as seen by the dispatcher.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Write one text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Write an empty ping control frame. May block until written.
    async fn send_ping(&self) -> Result<(), TransportError>;

    /// Send a close frame and stop reading from the connection.
    async fn close(&self, status: CloseStatus);
}

/// Subscription management collaborator.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Handle the commands of one decoded frame of an authenticated session.
    async fn handle_commands(&self, session: &SessionRef, cmds: Vec<WsCmd>);

    /// Drop every subscription of a closed session.
    async fn cancel_all_session_subscriptions(&self, session: &SessionRef);
}

/// Resolves a security token to an identity.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<SecurityCtx, AuthError>;
}

/// Resolves the effective profile of a tenant.
pub trait TenantProfileProvider: Send + Sync {
    fn profile(&self, tenant_id: &TenantId) -> Arc<TenantProfile>;
}
