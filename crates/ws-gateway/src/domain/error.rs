//! Gateway error types.
//!
//! One enum per layer. Connection-level failures end in a close frame,
//! command-level failures in an in-band [`CmdUpdate`](crate::CmdUpdate) error.

use crate::domain::ids::ExternalSessionId;
use crate::limits::LimitScope;
use thiserror::Error;

/// Service-level errors (startup, serving, shutdown).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound or served
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Gateway already started
    #[error("Gateway already running")]
    AlreadyRunning,
}

/// Inbound frame could not be decoded for the session's wire shape.
#[derive(Debug, Error)]
#[error("Failed to parse websocket command: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Token validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Auth cmd is missing")]
    MissingAuthCmd,

    #[error("Invalid token")]
    InvalidToken,
}

/// Errors reported by a transport implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Outcome of handing a message to the outbound dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Queue reached its negotiated cap; the session is being closed.
    #[error("Max pending updates limit reached!")]
    QueueOverflow,

    /// Session already closed; nothing was enqueued.
    #[error("Session is closed")]
    Closed,
}

/// A concurrent-session cap refused a new session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{}", scope.reason())]
pub struct LimitError {
    pub scope: LimitScope,
}

/// Subscription command failures surfaced to the client in-band.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Session {0} is not authenticated")]
    Unauthenticated(ExternalSessionId),

    #[error("Subscription {cmd_id} not found")]
    UnknownCommand { cmd_id: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_error_message() {
        let err = LimitError {
            scope: LimitScope::Tenant,
        };
        assert_eq!(err.to_string(), "Max tenant sessions limit reached!");
    }

    #[test]
    fn test_decode_error_wraps_serde() {
        let err: DecodeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Failed to parse websocket command"));
    }

    #[test]
    fn test_send_error_messages() {
        assert_eq!(
            SendError::QueueOverflow.to_string(),
            "Max pending updates limit reached!"
        );
    }
}
