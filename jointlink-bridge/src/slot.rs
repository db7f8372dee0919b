//! Latest-value slot shared between the ingest thread and the relay task.
//!
//! The slot holds at most one pending [`Frame`]. Writing replaces any frame
//! that was not read yet; reading removes the frame. The counters live under
//! the same lock so a status snapshot is always self-consistent.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use jointlink_common::Frame;

/// Frame counters, reset only at process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Valid frames accepted from the engine.
    pub received: u64,
    /// Frames transmitted to the device.
    pub sent: u64,
    /// Frames overwritten in the slot before the relay read them.
    pub dropped: u64,
}

impl Counters {
    /// Ratio of sent to received frames, `0.0` before anything was received.
    pub fn efficiency(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.sent as f64 / self.received as f64
        }
    }

    /// Efficiency as a percentage string for log output, e.g. `"50.0%"`.
    pub fn efficiency_percent(&self) -> String {
        format_percent(self.efficiency())
    }
}

/// Render a `[0, 1]` ratio with one decimal, e.g. `0.25` as `"25.0%"`.
pub(crate) fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[derive(Debug, Default)]
struct SlotInner {
    pending: Option<Frame>,
    counters: Counters,
}

/// Single-item, last-write-wins cell.
///
/// Written by the ingest side, drained by the relay. No operation holds the
/// lock across I/O.
#[derive(Debug, Default)]
pub struct LatestSlot {
    inner: Mutex<SlotInner>,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, replacing any unread one.
    ///
    /// Counts the frame as received, and the replaced frame (if any) as
    /// dropped. Returns the counters after the write.
    pub fn publish(&self, frame: Frame) -> Counters {
        let mut inner = self.inner.lock();
        inner.counters.received += 1;
        if inner.pending.replace(frame).is_some() {
            inner.counters.dropped += 1;
        }
        inner.counters
    }

    /// Remove and return the pending frame, leaving the slot empty.
    pub fn take(&self) -> Option<Frame> {
        self.inner.lock().pending.take()
    }

    /// Count one transmitted frame and return the new sent total.
    pub fn record_sent(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.counters.sent += 1;
        inner.counters.sent
    }

    /// Whether a frame is waiting to be sent.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn counters(&self) -> Counters {
        self.inner.lock().counters
    }
}
