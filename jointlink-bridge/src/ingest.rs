//! Ingest side: reads frames from the engine and publishes them to the slot.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use jointlink_common::{Inbound, current_timestamp_millis, decode_inbound};

use crate::error::{BridgeError, Result};
use crate::ipc::{MessageSource, ReadOutcome, is_disconnect};
use crate::state::{BridgeState, ConnectionState};

/// Log a progress line every this many received frames.
const PROGRESS_EVERY: u64 = 100;

/// Longest message excerpt included in a log line.
const LOG_EXCERPT_LEN: usize = 120;

/// Why the ingest loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestExit {
    /// The engine sent the exit sentinel.
    ExitRequested,
    /// The engine closed the channel.
    PeerDisconnected,
}

/// Owns the IPC endpoint for one engine connection.
///
/// [`start`](Self::start) blocks, so run it on a dedicated thread.
pub struct IngestChannel<S> {
    source: S,
    state: Arc<BridgeState>,
}

impl<S: MessageSource> IngestChannel<S> {
    pub fn new(source: S, state: Arc<BridgeState>) -> Self {
        Self { source, state }
    }

    /// Wait for the engine, then read until exit, disconnect, or I/O error.
    ///
    /// The IPC state is `Connected` while reading and `Disconnected` once
    /// this returns. There is no retry: one engine connection per run.
    pub fn start(mut self) -> Result<IngestExit> {
        let endpoint = self.source.describe();
        info!(endpoint = %endpoint, "Waiting for engine connection...");

        if let Err(e) = self.source.accept() {
            error!(endpoint = %endpoint, error = %e, "Failed to accept engine connection");
            self.state.set_ipc_state(ConnectionState::Disconnected);
            return Err(BridgeError::Io(e));
        }

        self.state.set_ipc_state(ConnectionState::Connected);
        info!(endpoint = %endpoint, "Engine connected");

        let result = self.read_loop();
        self.state.set_ipc_state(ConnectionState::Disconnected);

        match &result {
            Ok(IngestExit::ExitRequested) => info!("Exit command received from engine"),
            Ok(IngestExit::PeerDisconnected) => warn!("Engine disconnected"),
            Err(e) => error!(error = %e, "IPC channel error"),
        }
        info!(endpoint = %endpoint, "IPC channel closed");

        result
    }

    fn read_loop(&mut self) -> Result<IngestExit> {
        loop {
            match self.source.read_message() {
                Ok(ReadOutcome::Message(text)) => {
                    if let Some(exit) = self.handle_message(&text) {
                        return Ok(exit);
                    }
                }
                Ok(ReadOutcome::Oversized(len)) => {
                    warn!(bytes = len, "Discarding oversized message");
                }
                Ok(ReadOutcome::Closed) => return Ok(IngestExit::PeerDisconnected),
                Err(e) if is_disconnect(&e) => return Ok(IngestExit::PeerDisconnected),
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
    }

    /// Decode one message and publish it. Returns `Some` when reading must stop.
    fn handle_message(&self, text: &str) -> Option<IngestExit> {
        match decode_inbound(text, current_timestamp_millis()) {
            Ok(Inbound::Empty) => None,
            Ok(Inbound::Exit) => Some(IngestExit::ExitRequested),
            Ok(Inbound::Angles(frame)) => {
                let counters = self.state.slot.publish(frame);
                if counters.received % PROGRESS_EVERY == 0 {
                    info!(
                        received = counters.received,
                        sent = counters.sent,
                        dropped = counters.dropped,
                        efficiency = %counters.efficiency_percent(),
                        "Ingest progress"
                    );
                } else {
                    debug!(received = counters.received, "Frame updated");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, message = %excerpt(text), "Discarding malformed message");
                None
            }
        }
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(LOG_EXCERPT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ChannelSource;
    use jointlink_common::JOINT_COUNT;
    use std::io;

    fn angles_message(value: f64) -> String {
        format!(
            r#"{{"angles":[{}]}}"#,
            vec![value.to_string(); JOINT_COUNT].join(",")
        )
    }

    /// Scripted source replaying fixed read results.
    struct ScriptedSource {
        reads: std::vec::IntoIter<io::Result<ReadOutcome>>,
        accept_error: Option<io::ErrorKind>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<io::Result<ReadOutcome>>) -> Self {
            Self {
                reads: reads.into_iter(),
                accept_error: None,
            }
        }
    }

    impl MessageSource for ScriptedSource {
        fn accept(&mut self) -> io::Result<()> {
            match self.accept_error {
                Some(kind) => Err(io::Error::from(kind)),
                None => Ok(()),
            }
        }

        fn read_message(&mut self) -> io::Result<ReadOutcome> {
            self.reads.next().unwrap_or(Ok(ReadOutcome::Closed))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn run(messages: &[&str]) -> (Result<IngestExit>, Arc<BridgeState>) {
        let (tx, source) = ChannelSource::pair();
        for message in messages {
            tx.send(message.to_string()).unwrap();
        }
        drop(tx);

        let state = Arc::new(BridgeState::default());
        let result = IngestChannel::new(source, state.clone()).start();
        (result, state)
    }

    #[test]
    fn test_rapid_frames_keep_latest() {
        let (a, b, c) = (angles_message(0.0), angles_message(1.0), angles_message(2.0));
        let (result, state) = run(&[a.as_str(), b.as_str(), c.as_str()]);

        assert_eq!(result.unwrap(), IngestExit::PeerDisconnected);
        let frame = state.slot.take().unwrap();
        assert_eq!(frame.angles(), &[2.0; JOINT_COUNT]);

        let counters = state.slot.counters();
        assert_eq!(counters.received, 3);
        assert_eq!(counters.dropped, 2);
    }

    #[test]
    fn test_malformed_messages_are_skipped() {
        let valid = angles_message(5.0);
        let (result, state) = run(&[
            "not json",
            r#"{"angles":[1,2,3]}"#,
            r#"{"angles":[]}"#,
            r#"{"other":true}"#,
            "",
            valid.as_str(),
        ]);

        assert_eq!(result.unwrap(), IngestExit::PeerDisconnected);
        assert_eq!(state.slot.counters().received, 1);
        assert_eq!(state.slot.take().unwrap().angles(), &[5.0; JOINT_COUNT]);
    }

    #[test]
    fn test_exit_sentinel_stops_reading() {
        let after = angles_message(9.0);
        let (result, state) = run(&["EXIT", after.as_str()]);

        assert_eq!(result.unwrap(), IngestExit::ExitRequested);
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
        assert_eq!(state.slot.counters().received, 0);
        assert!(state.slot.take().is_none());
    }

    #[test]
    fn test_disconnect_error_is_normal_exit() {
        let source = ScriptedSource::new(vec![
            Ok(ReadOutcome::Message(angles_message(1.0))),
            Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        ]);
        let state = Arc::new(BridgeState::default());

        let result = IngestChannel::new(source, state.clone()).start();
        assert_eq!(result.unwrap(), IngestExit::PeerDisconnected);
        assert_eq!(state.slot.counters().received, 1);
    }

    #[test]
    fn test_io_fault_terminates_with_error() {
        let source = ScriptedSource::new(vec![
            Ok(ReadOutcome::Oversized(70_000)),
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            Ok(ReadOutcome::Message(angles_message(1.0))),
        ]);
        let state = Arc::new(BridgeState::default());

        let result = IngestChannel::new(source, state.clone()).start();
        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
        assert_eq!(state.slot.counters().received, 0);
    }

    #[test]
    fn test_accept_failure() {
        let mut source = ScriptedSource::new(Vec::new());
        source.accept_error = Some(io::ErrorKind::AddrInUse);
        let state = Arc::new(BridgeState::default());

        let result = IngestChannel::new(source, state.clone()).start();
        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connected_while_reading() {
        let (tx, source) = ChannelSource::pair();
        let state = Arc::new(BridgeState::default());

        let handle = {
            let state = state.clone();
            std::thread::spawn(move || IngestChannel::new(source, state).start())
        };

        tx.send(angles_message(3.0)).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while state.slot.counters().received == 0 {
            assert!(std::time::Instant::now() < deadline, "frame never arrived");
            std::thread::yield_now();
        }
        assert_eq!(state.ipc_state(), ConnectionState::Connected);

        tx.send("exit".to_string()).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), IngestExit::ExitRequested);
        assert_eq!(state.ipc_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short"), "short");
        let long = "é".repeat(LOG_EXCERPT_LEN + 10);
        assert_eq!(excerpt(&long).chars().count(), LOG_EXCERPT_LEN);
    }
}
