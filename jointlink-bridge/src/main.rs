//! JointLink bridge binary.
//!
//! Accepts one engine connection on a Unix socket and relays its joint
//! angles to the device until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use jointlink_bridge::{Bridge, BridgeArgs, BridgeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let config = args.load_config().with_context(|| match &args.config {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Invalid configuration".to_string(),
    })?;

    jointlink_common::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting jointlink-bridge");
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let bridge = Bridge::new(config.relay.clone());
    info!(
        device = %config.relay.url(),
        rate_hz = bridge.status().send_rate_hz,
        ipc = %config.ipc.path.display(),
        "Bridge configured"
    );

    let source = engine_source(&config)?;

    let reporter = config
        .status
        .report_interval()
        .map(|interval| bridge.spawn_status_reporter(interval));

    info!("Bridge running. Press Ctrl+C to stop.");

    tokio::select! {
        result = bridge.run(source) => {
            result.context("Failed to start bridge")?;
            warn!("Relay loop ended unexpectedly");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received shutdown signal");
        }
    }

    if let Some(reporter) = reporter {
        reporter.abort();
    }

    bridge.status().log("Final status");
    info!("Goodbye!");

    Ok(())
}

#[cfg(unix)]
fn engine_source(config: &BridgeConfig) -> Result<jointlink_bridge::UnixSocketSource> {
    jointlink_bridge::UnixSocketSource::bind(&config.ipc).context("Failed to open engine socket")
}

#[cfg(not(unix))]
fn engine_source(_config: &BridgeConfig) -> Result<jointlink_bridge::ChannelSource> {
    anyhow::bail!("the engine socket requires a Unix platform")
}
