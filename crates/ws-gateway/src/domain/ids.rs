//! Identifier types.
//!
//! Transport-level connections use UUID v7 (time-ordered, good for log
//! correlation). Everything handed to downstream components is keyed by the
//! external session id instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport connection id, assigned when the socket is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new connection id (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session id exposed to subscription management and the cluster.
///
/// Opaque and globally unique; generated at handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalSessionId(String);

impl ExternalSessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalSessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Tenant owning devices, customers and users.
    TenantId
);
uuid_id!(
    /// Customer inside a tenant.
    CustomerId
);
uuid_id!(
    /// Authenticated user (or public-id principal).
    UserId
);
uuid_id!(
    /// Target of a subscription: device, asset, user, ...
    EntityId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_external_session_id_roundtrips_through_json() {
        let id = ExternalSessionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn test_nil_detection() {
        assert!(CustomerId::new(Uuid::nil()).is_nil());
        assert!(!CustomerId::random().is_nil());
    }

    #[test]
    fn test_parse() {
        let uuid = Uuid::new_v4();
        let tenant = TenantId::parse(&uuid.to_string()).unwrap();
        assert_eq!(tenant, TenantId::new(uuid));
        assert!(EntityId::parse("not-a-uuid").is_err());
    }
}
