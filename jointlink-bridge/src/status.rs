//! Bridge status snapshot.

use serde::{Deserialize, Serialize};

use crate::slot::{Counters, format_percent};
use crate::state::{BridgeState, ConnectionState};

/// Point-in-time view of both connections and the frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Connection to the engine.
    pub ipc: ConnectionState,
    /// Connection to the device.
    pub relay: ConnectionState,
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    /// Current send rate in Hz.
    pub send_rate_hz: u32,
    /// `sent / received`, 0 before the first frame.
    pub efficiency: f64,
}

impl BridgeStatus {
    /// Take a snapshot of the shared state.
    ///
    /// Counters are read under one short lock, so they are consistent with
    /// each other. Connection states and rate are read atomically.
    pub fn capture(state: &BridgeState) -> Self {
        let counters = state.slot.counters();
        Self::from_parts(
            state.ipc_state(),
            state.relay_state(),
            counters,
            state.send_rate_hz(),
        )
    }

    fn from_parts(
        ipc: ConnectionState,
        relay: ConnectionState,
        counters: Counters,
        send_rate_hz: u32,
    ) -> Self {
        Self {
            ipc,
            relay,
            received: counters.received,
            sent: counters.sent,
            dropped: counters.dropped,
            send_rate_hz,
            efficiency: counters.efficiency(),
        }
    }

    /// Efficiency as a percentage string for log output, e.g. `"50.0%"`.
    pub fn efficiency_percent(&self) -> String {
        format_percent(self.efficiency)
    }

    /// Log this snapshot at info level.
    pub fn log(&self, message: &str) {
        tracing::info!(
            ipc = %self.ipc,
            relay = %self.relay,
            received = self.received,
            sent = self.sent,
            dropped = self.dropped,
            rate_hz = self.send_rate_hz,
            efficiency = %self.efficiency_percent(),
            "{}",
            message
        );
    }
}
