//! Per-session update rate limiting with hysteresis.
//!
//! A denied session is warned once ("too many updates") and blacklisted;
//! further denials are dropped silently until a check succeeds again.
//!
//! Each window is a greedy token bucket: `capacity` tokens refilled evenly
//! over `period`. An update takes one token from every window or from
//! none, so a denial never eats into quota.

use crate::domain::config::RateWindow;
use crate::domain::ids::{ExternalSessionId, TenantId};
use dashmap::{DashMap, DashSet};
use std::time::Instant;
use tracing::debug;

/// What to do with one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Within limits: deliver the update.
    Deliver,
    /// First denial of an episode: send one "too many updates" error.
    WarnOnce,
    /// Denied again while blacklisted: drop silently.
    Drop,
}

struct WindowBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
}

struct SessionBucket {
    tenant_id: TenantId,
    windows: Vec<WindowBucket>,
    last_refill: Instant,
}

impl SessionBucket {
    fn new(tenant_id: TenantId, windows: &[RateWindow], now: Instant) -> Self {
        let windows = windows
            .iter()
            .filter(|w| !w.period.is_zero())
            .map(|w| {
                let capacity = f64::from(w.capacity.get());
                WindowBucket {
                    capacity,
                    refill_per_sec: capacity / w.period.as_secs_f64(),
                    tokens: capacity,
                }
            })
            .collect();
        Self {
            tenant_id,
            windows,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = self.last_refill.max(now);
        for w in &mut self.windows {
            w.tokens = (w.tokens + elapsed * w.refill_per_sec).min(w.capacity);
        }

        if !self.windows.iter().all(|w| w.tokens >= 1.0) {
            return false;
        }
        for w in &mut self.windows {
            w.tokens -= 1.0;
        }
        true
    }
}

/// Rate limiter keyed by external session id.
#[derive(Default)]
pub struct UpdateRateLimiter {
    buckets: DashMap<ExternalSessionId, SessionBucket>,
    blacklist: DashSet<ExternalSessionId>,
}

impl UpdateRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one update for `session_id` against the tenant's windows.
    ///
    /// The bucket is created lazily on first use with the windows passed
    /// at that time.
    pub fn check(
        &self,
        tenant_id: &TenantId,
        session_id: &ExternalSessionId,
        windows: &[RateWindow],
    ) -> UpdateDecision {
        self.check_at(tenant_id, session_id, windows, Instant::now())
    }

    fn check_at(
        &self,
        tenant_id: &TenantId,
        session_id: &ExternalSessionId,
        windows: &[RateWindow],
        now: Instant,
    ) -> UpdateDecision {
        if windows.is_empty() {
            return self.apply_decision(session_id, true);
        }

        let allowed = self
            .buckets
            .entry(session_id.clone())
            .or_insert_with(|| SessionBucket::new(*tenant_id, windows, now))
            .try_acquire(now);

        self.apply_decision(session_id, allowed)
    }

    fn apply_decision(&self, session_id: &ExternalSessionId, allowed: bool) -> UpdateDecision {
        if allowed {
            self.blacklist.remove(session_id);
            UpdateDecision::Deliver
        } else if self.blacklist.insert(session_id.clone()) {
            UpdateDecision::WarnOnce
        } else {
            UpdateDecision::Drop
        }
    }

    /// Drop limiter and blacklist state of a closed session.
    pub fn forget(&self, session_id: &ExternalSessionId) {
        if let Some((_, bucket)) = self.buckets.remove(session_id) {
            debug!(
                session_id = %session_id,
                tenant_id = %bucket.tenant_id,
                "Removed update rate limiter"
            );
        }
        self.blacklist.remove(session_id);
    }

    pub fn tracked_sessions(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_blacklisted(&self, session_id: &ExternalSessionId) -> bool {
        self.blacklist.contains(session_id)
    }
}
