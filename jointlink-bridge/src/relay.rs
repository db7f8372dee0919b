//! Relay side: paced forwarding of the latest frame to the device.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use jointlink_common::encode_frame;

use crate::config::RelayConfig;
use crate::error::{BridgeError, Result};
use crate::state::{BridgeState, ConnectionState};

/// Log every this many sent frames at info level.
const SENT_LOG_EVERY: u64 = 50;

/// Decides when the next send may happen.
///
/// A send is due once the configured interval has elapsed since the last
/// send. Sends that happen slightly late keep the schedule, so the average
/// spacing is exactly one interval. After a stall of two intervals or more
/// the schedule restarts from the late send: missed ticks are not made up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cadence {
    last_send: Option<Instant>,
}

impl Cadence {
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.last_send
            .is_none_or(|last| now.saturating_duration_since(last) >= interval)
    }

    /// Instant the next send becomes due, `None` before the first send.
    pub fn next_due(&self, interval: Duration) -> Option<Instant> {
        self.last_send.map(|last| last + interval)
    }

    /// Record a send made at `now`.
    pub fn mark_sent(&mut self, now: Instant, interval: Duration) {
        self.last_send = Some(match self.last_send {
            Some(last) if now.saturating_duration_since(last) < interval * 2 => {
                (last + interval).min(now)
            }
            _ => now,
        });
    }
}

/// Sleep until `due`. Nothing scheduled yet means due now.
async fn sleep_until_due(due: Option<Instant>) {
    if let Some(due) = due {
        tokio::time::sleep_until(due).await;
    }
}

/// Owns the outbound WebSocket connection.
pub struct RateLimitedRelay {
    url: String,
    reconnect_delay: Duration,
    poll_interval: Duration,
    state: Arc<BridgeState>,
}

impl RateLimitedRelay {
    pub fn new(config: &RelayConfig, state: Arc<BridgeState>) -> Self {
        Self {
            url: config.url(),
            reconnect_delay: config.reconnect_delay(),
            poll_interval: config.poll_interval(),
            state,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, send, and reconnect forever.
    ///
    /// Every connect failure or lost connection is followed by the fixed
    /// reconnect delay. This future never completes; drop it to stop.
    pub async fn run(&self) {
        let mut cadence = Cadence::default();

        loop {
            self.state.set_relay_state(ConnectionState::Connecting);
            info!(url = %self.url, "Connecting to device");

            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((ws, _response)) => {
                    self.state.set_relay_state(ConnectionState::Connected);
                    info!(
                        url = %self.url,
                        rate_hz = self.state.send_rate_hz(),
                        "Connected to device"
                    );

                    let (mut sink, mut stream) = ws.split();
                    match self.send_loop(&mut sink, &mut stream, &mut cadence).await {
                        BridgeError::RemoteClosed => warn!("WebSocket closed by device"),
                        e => error!(error = %e, "Error sending to device"),
                    }
                }
                Err(e) => {
                    error!(url = %self.url, error = %e, "Failed to connect to device");
                }
            }

            self.state.set_relay_state(ConnectionState::Disconnected);
            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Retrying device connection"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Run the paced send loop until the connection fails.
    ///
    /// Wakes when a pending frame becomes due, on every poll tick (to pick up
    /// new frames and rate changes) and on inbound traffic.
    async fn send_loop<K, S>(
        &self,
        sink: &mut K,
        stream: &mut S,
        cadence: &mut Cadence,
    ) -> BridgeError
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin,
        S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let due = cadence.next_due(self.state.send_interval());
            let pending = self.state.slot.is_pending();

            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Close frame received");
                        return BridgeError::RemoteClosed;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(message = %text, "Message from device");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return e.into(),
                    None => return BridgeError::RemoteClosed,
                },
                _ = sleep_until_due(due), if pending => {
                    if let Err(e) = self.tick(sink, cadence).await {
                        return e;
                    }
                }
                _ = poll.tick() => {
                    if let Err(e) = self.tick(sink, cadence).await {
                        return e;
                    }
                }
            }
        }
    }

    /// Send the pending frame if the cadence allows it.
    ///
    /// The frame leaves the slot before the send, so a failed send loses it.
    async fn tick<K>(&self, sink: &mut K, cadence: &mut Cadence) -> Result<()>
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let now = Instant::now();
        let interval = self.state.send_interval();
        if !cadence.is_due(now, interval) {
            return Ok(());
        }

        let Some(frame) = self.state.slot.take() else {
            return Ok(());
        };

        let payload = encode_frame(&frame)?;
        sink.send(Message::Text(payload)).await?;

        let sent = self.state.slot.record_sent();
        cadence.mark_sent(now, interval);

        if sent % SENT_LOG_EVERY == 0 {
            info!(sent, "Sent frame to device");
        } else {
            debug!(sent, "Sent frame to device");
        }
        Ok(())
    }
}
