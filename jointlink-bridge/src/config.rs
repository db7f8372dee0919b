//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jointlink_common::LoggingConfig;

use crate::error::{BridgeError, Result};
use crate::state::{DEFAULT_SEND_RATE_HZ, clamp_send_rate};

/// Complete bridge configuration.
///
/// Every section is optional; `{}` is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Local IPC endpoint the engine connects to.
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Outbound WebSocket link to the device.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Periodic status reporting.
    #[serde(default)]
    pub status: StatusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local IPC endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Unix socket path the engine connects to.
    #[serde(default = "default_ipc_path")]
    pub path: PathBuf,

    /// Largest accepted message in bytes, newline excluded.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Remove a stale socket file before binding.
    #[serde(default = "default_true")]
    pub remove_existing_socket: bool,
}

fn default_ipc_path() -> PathBuf {
    PathBuf::from("/tmp/jointlink.sock")
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            path: default_ipc_path(),
            max_message_size: default_max_message_size(),
            remove_existing_socket: default_true(),
        }
    }
}

/// Outbound relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Device host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Device WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path on the device.
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Frames per second sent to the device, clamped to `[1, 100]`.
    #[serde(default = "default_send_rate_hz")]
    pub send_rate_hz: u32,

    /// Delay before retrying a failed or lost connection.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// How often the send loop wakes up to check the cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_host() -> String {
    "192.168.1.27".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_send_rate_hz() -> u32 {
    DEFAULT_SEND_RATE_HZ
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    5
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_ws_path(),
            send_rate_hz: default_send_rate_hz(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RelayConfig {
    /// WebSocket URL of the device, e.g. `ws://192.168.1.27:80/ws`.
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Status reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds between status log lines; 0 disables the reporter.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_report_interval_secs() -> u64 {
    10
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl StatusConfig {
    /// Reporting period, `None` when disabled.
    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs))
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The send rate is clamped and the result validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = json5::from_str(content)?;
        config.relay.send_rate_hz = clamp_send_rate(config.relay.send_rate_hz);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ipc.path.as_os_str().is_empty() {
            return Err(BridgeError::validation("ipc.path must not be empty"));
        }
        if self.ipc.max_message_size == 0 {
            return Err(BridgeError::validation(
                "ipc.max_message_size must be greater than 0",
            ));
        }
        if self.relay.host.trim().is_empty() {
            return Err(BridgeError::validation("relay.host must not be empty"));
        }
        if self.relay.port == 0 {
            return Err(BridgeError::validation("relay.port must not be 0"));
        }
        if !self.relay.path.starts_with('/') {
            return Err(BridgeError::validation(format!(
                "relay.path must start with '/' (got '{}')",
                self.relay.path
            )));
        }
        if !(1..=100).contains(&self.relay.poll_interval_ms) {
            return Err(BridgeError::validation(
                "relay.poll_interval_ms must be between 1 and 100",
            ));
        }
        Ok(())
    }
}
