//! # Gateway Node
//!
//! Runs one WebSocket gateway node.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (TOML file, then `WSG_*` environment)
//! 3. Join the cluster bus and start the gateway service
//! 4. Wait for Ctrl+C, then close every session and exit

use anyhow::Result;
use clap::Parser;
use cluster_bus::{InMemoryCluster, NodeId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ws_gateway::GatewayService;

#[derive(Parser, Debug)]
#[command(name = "gateway-node")]
#[command(about = "Real-time WebSocket delivery gateway node")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let config = gateway_node::load_config(args.config.as_deref())?;

    // Single node: load_config has refused any peers
    let cluster = Arc::new(InMemoryCluster::with_capacity(config.cluster.ingress_capacity));
    let node_id = NodeId::new(config.cluster.node_id.clone());
    let ingress = cluster.register_node(node_id.clone());
    let transport = Arc::new(cluster.transport(node_id));

    let service = Arc::new(GatewayService::new(config, transport, ingress)?);

    let mut running = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.start().await })
    };

    info!("Gateway is running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Initiating graceful shutdown...");
            service.shutdown();
            running.await??;
        }
        result = &mut running => {
            result??;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
