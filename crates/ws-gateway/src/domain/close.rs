//! WebSocket close statuses.

use std::borrow::Cow;
use std::fmt;

/// Close codes sent to clients.
pub mod codes {
    pub const NORMAL: u16 = 1000;
    pub const BAD_DATA: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const SERVER_ERROR: u16 = 1011;
    /// Application range; peer failed to keep up with writes or pings.
    pub const SESSION_NOT_RELIABLE: u16 = 4500;
}

/// Close code plus human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: u16,
    pub reason: Cow<'static, str>,
}

impl CloseStatus {
    pub fn new(code: u16, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(codes::NORMAL, "")
    }

    pub fn bad_data(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::BAD_DATA, reason)
    }

    pub fn policy_violation(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::POLICY_VIOLATION, reason)
    }

    pub fn server_error(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::SERVER_ERROR, reason)
    }

    pub fn not_reliable() -> Self {
        Self::new(codes::SESSION_NOT_RELIABLE, "Session not reliable")
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}
