//! State shared by the ingest channel, the relay and the orchestrator.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::slot::LatestSlot;

/// Lowest accepted send rate.
pub const MIN_SEND_RATE_HZ: u32 = 1;
/// Highest accepted send rate.
pub const MAX_SEND_RATE_HZ: u32 = 100;
/// Send rate used when none is configured.
pub const DEFAULT_SEND_RATE_HZ: u32 = 20;

/// Clamp a requested send rate to the supported range.
pub fn clamp_send_rate(hz: u32) -> u32 {
    hz.clamp(MIN_SEND_RATE_HZ, MAX_SEND_RATE_HZ)
}

/// Connection state of one side of the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lock-free holder for a [`ConnectionState`].
#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }
}

/// Everything the two execution contexts share.
///
/// Created once by the orchestrator and handed to both sides behind an `Arc`.
/// The IPC state is written only by the ingest channel, the relay state only
/// by the relay.
#[derive(Debug)]
pub struct BridgeState {
    /// Pending frame and counters.
    pub slot: LatestSlot,
    ipc: StateCell,
    relay: StateCell,
    send_rate_hz: AtomicU32,
}

impl BridgeState {
    /// Create a fresh state with the given (clamped) send rate.
    pub fn new(send_rate_hz: u32) -> Self {
        Self {
            slot: LatestSlot::new(),
            ipc: StateCell::default(),
            relay: StateCell::default(),
            send_rate_hz: AtomicU32::new(clamp_send_rate(send_rate_hz)),
        }
    }

    pub fn ipc_state(&self) -> ConnectionState {
        self.ipc.get()
    }

    pub fn relay_state(&self) -> ConnectionState {
        self.relay.get()
    }

    pub(crate) fn set_ipc_state(&self, state: ConnectionState) {
        self.ipc.set(state);
    }

    pub(crate) fn set_relay_state(&self, state: ConnectionState) {
        self.relay.set(state);
    }

    pub fn send_rate_hz(&self) -> u32 {
        self.send_rate_hz.load(Ordering::SeqCst)
    }

    /// Store a new send rate, clamped to `[1, 100]`. Returns the applied rate.
    pub fn set_send_rate(&self, hz: u32) -> u32 {
        let hz = clamp_send_rate(hz);
        self.send_rate_hz.store(hz, Ordering::SeqCst);
        hz
    }

    /// Minimum time between two sends at the current rate.
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(1) / self.send_rate_hz()
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_RATE_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_send_rate() {
        assert_eq!(clamp_send_rate(0), 1);
        assert_eq!(clamp_send_rate(1), 1);
        assert_eq!(clamp_send_rate(15), 15);
        assert_eq!(clamp_send_rate(100), 100);
        assert_eq!(clamp_send_rate(250), 100);
    }

    #[test]
    fn test_send_interval_follows_rate() {
        let state = BridgeState::new(10);
        assert_eq!(state.send_interval(), Duration::from_millis(100));

        assert_eq!(state.set_send_rate(0), 1);
        assert_eq!(state.send_interval(), Duration::from_secs(1));

        assert_eq!(state.set_send_rate(1000), 100);
        assert_eq!(state.send_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_connection_states_start_disconnected() {
        let state = BridgeState::default();
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
        assert_eq!(state.relay_state(), ConnectionState::Disconnected);
        assert_eq!(state.send_rate_hz(), DEFAULT_SEND_RATE_HZ);
    }

    #[test]
    fn test_state_cell_roundtrip() {
        let state = BridgeState::default();
        for s in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ] {
            state.set_relay_state(s);
            assert_eq!(state.relay_state(), s);
        }
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"connecting\""
        );
    }
}
