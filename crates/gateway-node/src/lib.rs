//! Configuration loading for the gateway node binary.
//!
//! A TOML file (optional) is read first, then `WSG_*` environment variables
//! override individual keys, then the result is validated.
//!
//! The node runs on the in-process cluster bus, so it must own every
//! partition itself: configured peers are rejected.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;
use ws_gateway::GatewayConfig;

/// Environment variables understood by [`apply_env_overrides`].
pub const ENV_HOST: &str = "WSG_HOST";
pub const ENV_PORT: &str = "WSG_PORT";
pub const ENV_NODE_ID: &str = "WSG_NODE_ID";
pub const ENV_PARTITIONS: &str = "WSG_PARTITIONS";
/// Comma-separated peer node ids
pub const ENV_PEERS: &str = "WSG_PEERS";

/// Load configuration from an optional file and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: GatewayConfig = toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        None => GatewayConfig::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
    config.validate().context("invalid gateway configuration")?;
    ensure_single_process(&config)?;
    Ok(config)
}

/// Refuse peers: partitions assigned to them would be forwarded to nodes
/// the in-process bus cannot reach.
pub fn ensure_single_process(config: &GatewayConfig) -> Result<()> {
    if !config.cluster.peers.is_empty() {
        bail!(
            "in-process cluster bus cannot reach peers {:?}; remove cluster.peers",
            config.cluster.peers
        );
    }
    Ok(())
}

/// Apply `WSG_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(mut config: GatewayConfig, lookup: F) -> Result<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_HOST) {
        config.server.host = host
            .parse()
            .with_context(|| format!("{ENV_HOST} is not an IP address: {host}"))?;
    }
    if let Some(port) = lookup(ENV_PORT) {
        config.server.port = port
            .parse()
            .with_context(|| format!("{ENV_PORT} is not a port: {port}"))?;
    }
    if let Some(node_id) = lookup(ENV_NODE_ID) {
        config.cluster.node_id = node_id;
    }
    if let Some(partitions) = lookup(ENV_PARTITIONS) {
        config.cluster.partitions = partitions
            .parse()
            .with_context(|| format!("{ENV_PARTITIONS} is not a number: {partitions}"))?;
    }
    if let Some(peers) = lookup(ENV_PEERS) {
        config.cluster.peers = peers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
    }
    Ok(config)
}
