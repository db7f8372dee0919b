//! CLI argument parsing for the bridge binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::state::clamp_send_rate;

/// Relays joint angles from a local engine to a WebSocket device.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "jointlink-bridge")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format). Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the device host.
    #[arg(long)]
    pub host: Option<String>,

    /// Override the device WebSocket port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the send rate in Hz (clamped to 1-100).
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Override the engine socket path.
    #[arg(long)]
    pub ipc_path: Option<PathBuf>,
}

impl BridgeArgs {
    /// Load the configuration file (or defaults), apply overrides and validate.
    pub fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.host {
            config.relay.host = host.clone();
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(rate) = self.rate {
            config.relay.send_rate_hz = clamp_send_rate(rate);
        }
        if let Some(path) = &self.ipc_path {
            config.ipc.path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging = config.logging.clone().with_level_override(Some(level.as_str()));
        }
    }
}
