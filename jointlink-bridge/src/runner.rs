//! Orchestrator wiring the ingest channel and the relay together.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::ingest::{IngestChannel, IngestExit};
use crate::ipc::MessageSource;
use crate::relay::RateLimitedRelay;
use crate::state::BridgeState;
use crate::status::BridgeStatus;

/// Name of the ingest worker thread.
pub const INGEST_THREAD_NAME: &str = "ipc-ingest";

/// Owns the shared state and starts both sides of the bridge.
///
/// Cloning is cheap; clones share the same state.
///
/// # Example
///
/// ```ignore
/// let bridge = Bridge::new(config.relay.clone());
/// let source = UnixSocketSource::bind(&config.ipc)?;
///
/// bridge.spawn_ingest(source)?;
/// bridge.spawn_status_reporter(Duration::from_secs(10));
/// bridge.relay().run().await;
/// ```
#[derive(Clone)]
pub struct Bridge {
    state: Arc<BridgeState>,
    relay: RelayConfig,
}

impl Bridge {
    /// Create a bridge with the configured (clamped) send rate.
    pub fn new(relay: RelayConfig) -> Self {
        let state = Arc::new(BridgeState::new(relay.send_rate_hz));
        Self { state, relay }
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    /// Change the send rate, clamped to `[1, 100]`.
    ///
    /// The relay picks the new interval up on its next tick. Returns the
    /// applied rate.
    pub fn set_send_rate(&self, hz: u32) -> u32 {
        let applied = self.state.set_send_rate(hz);
        if applied != hz {
            tracing::warn!(requested = hz, applied, "Send rate clamped");
        }
        tracing::info!(rate_hz = applied, "Send rate updated");
        applied
    }

    /// Snapshot of connection states and counters.
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus::capture(&self.state)
    }

    /// Start the blocking ingest loop on its own thread.
    pub fn spawn_ingest<S>(&self, source: S) -> io::Result<thread::JoinHandle<Result<IngestExit>>>
    where
        S: MessageSource + Send + 'static,
    {
        let channel = IngestChannel::new(source, self.state.clone());
        thread::Builder::new()
            .name(INGEST_THREAD_NAME.to_string())
            .spawn(move || channel.start())
    }

    /// Build the relay for this bridge's device connection.
    pub fn relay(&self) -> RateLimitedRelay {
        RateLimitedRelay::new(&self.relay, self.state.clone())
    }

    /// Log the status snapshot every `interval` until the task is aborted.
    pub fn spawn_status_reporter(&self, interval: Duration) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                bridge.status().log("Bridge status");
            }
        })
    }

    /// Start ingest in the background and run the relay.
    ///
    /// Only returns if the ingest thread cannot be spawned. The ingest side
    /// ending (exit sentinel, disconnect, I/O error) does not stop the relay.
    pub async fn run<S>(&self, source: S) -> Result<()>
    where
        S: MessageSource + Send + 'static,
    {
        self.spawn_ingest(source)?;
        tracing::info!(
            url = %self.relay.url(),
            rate_hz = self.state.send_rate_hz(),
            "Bridge running"
        );
        self.relay().run().await;
        Ok(())
    }
}
