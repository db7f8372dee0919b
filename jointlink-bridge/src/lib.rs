//! JointLink Bridge
//!
//! Relays joint-angle frames from a local engine to a remote device over
//! WebSocket, at a bounded rate, keeping only the freshest frame.
//!
//! # Overview
//!
//! Data flows one way:
//!
//! ```text
//! engine --IPC--> IngestChannel --> LatestSlot --> RateLimitedRelay --ws--> device
//! ```
//!
//! - [`IngestChannel`] blocks on the IPC endpoint on its own thread and
//!   publishes every valid frame into the [`LatestSlot`].
//! - [`RateLimitedRelay`] drains the slot at most once per send interval and
//!   reconnects with a fixed delay whenever the device link fails.
//! - [`Bridge`] wires both sides to one [`BridgeState`], exposes the send
//!   rate and a [`BridgeStatus`] snapshot.
//!
//! # Example
//!
//! ```ignore
//! use jointlink_bridge::{Bridge, BridgeConfig, UnixSocketSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::load("jointlink.json5")?;
//!     let source = UnixSocketSource::bind(&config.ipc)?;
//!
//!     let bridge = Bridge::new(config.relay.clone());
//!     bridge.run(source).await?;
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ipc;
pub mod relay;
pub mod runner;
pub mod slot;
pub mod state;
pub mod status;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, IpcConfig, RelayConfig, StatusConfig};
pub use error::{BridgeError, Result};
pub use ingest::{IngestChannel, IngestExit};
#[cfg(unix)]
pub use ipc::UnixSocketSource;
pub use ipc::{ChannelSource, MessageSource, ReadOutcome};
pub use relay::RateLimitedRelay;
pub use runner::Bridge;
pub use slot::{Counters, LatestSlot};
pub use state::{BridgeState, ConnectionState};
pub use status::BridgeStatus;

// Re-export commonly used types from jointlink-common
pub use jointlink_common::{Frame, JOINT_COUNT, LoggingConfig};
