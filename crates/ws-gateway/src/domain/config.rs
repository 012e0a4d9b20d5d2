//! Gateway configuration with validation.
//!
//! Every section is `#[serde(default)]`, so a partial TOML file only needs
//! the keys it overrides. Durations accept `"30s"`, `"500ms"` or `"1m"`.

use crate::domain::ids::{CustomerId, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,
    /// Session transport tuning
    pub ws: WsConfig,
    /// Tenant profiles (session caps, queue cap, update rate)
    pub limits: LimitsConfig,
    /// Static token table
    pub auth: AuthConfig,
    /// Cluster membership and partitioning
    pub cluster: ClusterConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws.send_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "send_timeout cannot be 0".into(),
            ));
        }
        if self.ws.ping_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "ping_timeout cannot be 0".into(),
            ));
        }
        if self.ws.auth_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "auth_timeout cannot be 0".into(),
            ));
        }
        if self.ws.auth_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "auth_sweep_interval cannot be 0".into(),
            ));
        }
        if self.ws.ping_attempts == 0 {
            return Err(ConfigError::InvalidLimit(
                "ping_attempts cannot be 0".into(),
            ));
        }
        if self.ws.ping_period().is_zero() {
            return Err(ConfigError::InvalidTimeout(format!(
                "ping_timeout {:?} is too short for {} ping attempts",
                self.ws.ping_timeout, self.ws.ping_attempts
            )));
        }
        if self.ws.max_queue_messages_per_session == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_queue_messages_per_session cannot be 0".into(),
            ));
        }
        if self.ws.worker_threads == 0 {
            return Err(ConfigError::InvalidLimit(
                "worker_threads cannot be 0".into(),
            ));
        }
        if self.cluster.partitions == 0 {
            return Err(ConfigError::Invalid("cluster.partitions cannot be 0".into()));
        }
        if self.cluster.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster.node_id cannot be empty".into()));
        }

        let profiles = std::iter::once(&self.limits.default_profile).chain(self.limits.tenants.values());
        for profile in profiles {
            if let Some(spec) = &profile.updates_rate_limit {
                parse_rate_limit(spec)?;
            }
        }

        Ok(())
    }

    /// Listener bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
        }
    }
}

/// Session transport tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Upper bound on a single text write
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Idle time after which a session is considered dead
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
    /// Pings sent within one `ping_timeout`; the sweep runs every `ping_timeout / ping_attempts`
    pub ping_attempts: u32,
    /// Global outbound queue cap; tenant profiles may only lower it
    pub max_queue_messages_per_session: usize,
    /// Time allowed for a deferred `authCmd`
    #[serde(with = "humantime_serde")]
    pub auth_timeout: Duration,
    /// Pending-auth eviction sweep period
    #[serde(with = "humantime_serde")]
    pub auth_sweep_interval: Duration,
    /// Worker pool size for inbound command drains
    pub worker_threads: usize,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(5000),
            ping_timeout: Duration::from_millis(30000),
            ping_attempts: 3,
            max_queue_messages_per_session: 1000,
            auth_timeout: Duration::from_millis(10000),
            auth_sweep_interval: Duration::from_millis(1000),
            worker_threads: 8,
            max_message_size: 64 * 1024,
        }
    }
}

impl WsConfig {
    /// Liveness sweep period
    pub fn ping_period(&self) -> Duration {
        self.ping_timeout / self.ping_attempts.max(1)
    }
}

/// Tenant profile as configured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantProfileConfig {
    /// 0 = unlimited
    pub max_sessions_per_tenant: u32,
    /// 0 = unlimited
    pub max_sessions_per_customer: u32,
    /// 0 = unlimited
    pub max_sessions_per_regular_user: u32,
    /// 0 = unlimited
    pub max_sessions_per_public_user: u32,
    /// 0 = use the global cap
    pub max_queue_messages_per_session: usize,
    /// `capacity:seconds[,capacity:seconds...]`, e.g. `"10:1,300:60"`
    pub updates_rate_limit: Option<String>,
}

/// Tenant profiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Applied to tenants without an override
    pub default_profile: TenantProfileConfig,
    /// Per-tenant overrides
    pub tenants: HashMap<TenantId, TenantProfileConfig>,
}

/// One token accepted by the static validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub user_id: UserId,
    /// Token belongs to a public-id principal
    #[serde(default)]
    pub public: bool,
}

/// Static token table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenGrant>,
}

/// Cluster membership and partitioning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// This node's id
    pub node_id: String,
    /// Other nodes; partitions are spread round-robin over the sorted member list
    pub peers: Vec<String>,
    /// Partition count of the core topic
    pub partitions: u32,
    /// Core topic name
    pub topic: String,
    /// Ingress queue capacity per node
    pub ingress_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: "node-0".to_string(),
            peers: Vec::new(),
            partitions: 10,
            topic: "tb_core".to_string(),
            ingress_capacity: 1000,
        }
    }
}

/// One rate-limit window: at most `capacity` updates per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub capacity: NonZeroU32,
    pub period: Duration,
}

/// Parse `capacity:seconds[,capacity:seconds...]`.
pub fn parse_rate_limit(spec: &str) -> Result<Vec<RateWindow>, ConfigError> {
    let mut windows = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (capacity, seconds) = part
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidRateLimit(format!("missing ':' in {part:?}")))?;

        let capacity = capacity
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| ConfigError::InvalidRateLimit(format!("bad capacity in {part:?}")))?;
        let seconds = seconds
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| ConfigError::InvalidRateLimit(format!("bad period in {part:?}")))?;

        windows.push(RateWindow {
            capacity,
            period: Duration::from_secs(seconds),
        });
    }
    Ok(windows)
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Plain numbers are milliseconds
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid duration format")
        }
    }
}
