//! Multi-tenant limits.
//!
//! - [`SessionLimiter`]: concurrent-session caps per tenant, customer,
//!   regular user and public user
//! - [`UpdateRateLimiter`]: per-session update rate with a one-shot warning
//!   blacklist

pub mod sessions;
pub mod updates;

pub use sessions::{LimitScope, SessionLimiter};
pub use updates::{UpdateDecision, UpdateRateLimiter};

use crate::domain::config::{parse_rate_limit, ConfigError, RateWindow, TenantProfileConfig};

/// Effective limits of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantProfile {
    pub max_sessions_per_tenant: u32,
    pub max_sessions_per_customer: u32,
    pub max_sessions_per_regular_user: u32,
    pub max_sessions_per_public_user: u32,
    /// 0 = use the global cap
    pub max_queue_messages_per_session: usize,
    /// Empty = no update rate limit
    pub update_windows: Vec<RateWindow>,
}

impl TenantProfile {
    pub fn from_config(config: &TenantProfileConfig) -> Result<Self, ConfigError> {
        let update_windows = match &config.updates_rate_limit {
            Some(spec) => parse_rate_limit(spec)?,
            None => Vec::new(),
        };
        Ok(Self {
            max_sessions_per_tenant: config.max_sessions_per_tenant,
            max_sessions_per_customer: config.max_sessions_per_customer,
            max_sessions_per_regular_user: config.max_sessions_per_regular_user,
            max_sessions_per_public_user: config.max_sessions_per_public_user,
            max_queue_messages_per_session: config.max_queue_messages_per_session,
            update_windows,
        })
    }

    /// Queue cap for a session of this tenant; never above `global`.
    pub fn negotiated_queue_cap(&self, global: usize) -> usize {
        match self.max_queue_messages_per_session {
            0 => global,
            cap => cap.min(global),
        }
    }
}
