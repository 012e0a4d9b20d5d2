//! Session identity and security context.

use crate::domain::ids::{CustomerId, ExternalSessionId, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Kind of channel, fixed at handshake from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// `/api/ws`: typed command envelope.
    General,
    /// `/api/ws/plugins/telemetry`: legacy telemetry wrapper.
    Telemetry,
    /// `/api/ws/plugins/notifications`: legacy notifications wrapper.
    Notifications,
}

impl SessionType {
    /// Resolve the legacy `plugins/{suffix}` path segment.
    pub fn from_plugin_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "telemetry" => Some(Self::Telemetry),
            "notifications" => Some(Self::Notifications),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Telemetry => "telemetry",
            Self::Notifications => "notifications",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPrincipalKind {
    UserName,
    PublicId,
}

/// Identity bound to an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCtx {
    pub tenant_id: TenantId,
    pub customer_id: Option<CustomerId>,
    pub user_id: UserId,
    pub principal: UserPrincipalKind,
}

impl SecurityCtx {
    /// True when the identity belongs to a (non-nil) customer.
    pub fn is_customer_scoped(&self) -> bool {
        self.customer_id.is_some_and(|c| !c.is_nil())
    }

    pub fn is_public(&self) -> bool {
        self.principal == UserPrincipalKind::PublicId
    }
}

/// Immutable session identity plus connection metadata.
///
/// The security context is the only mutable part and can be set once.
#[derive(Debug)]
pub struct SessionRef {
    external_id: ExternalSessionId,
    session_type: SessionType,
    security: OnceLock<SecurityCtx>,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
}

impl SessionRef {
    pub fn new(
        session_type: SessionType,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            external_id: ExternalSessionId::generate(),
            session_type,
            security: OnceLock::new(),
            local_addr,
            remote_addr,
        }
    }

    pub fn external_id(&self) -> &ExternalSessionId {
        &self.external_id
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn security_ctx(&self) -> Option<&SecurityCtx> {
        self.security.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.security.get().is_some()
    }

    /// Bind the security context. Returns `false` if one was already bound.
    pub fn bind_security(&self, ctx: SecurityCtx) -> bool {
        self.security.set(ctx).is_ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}
