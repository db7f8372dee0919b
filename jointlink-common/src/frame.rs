use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Number of joint angles carried by every frame (6 legs x 3 joints).
pub const JOINT_COUNT: usize = 18;

/// Text message that asks the bridge to stop ingesting.
pub const EXIT_SENTINEL: &str = "exit";

/// A single joint-angle telemetry sample.
///
/// A `Frame` can only be built from exactly [`JOINT_COUNT`] angles, so any
/// value of this type is valid to relay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    angles: [f64; JOINT_COUNT],
    /// Unix epoch milliseconds when the frame was captured.
    timestamp: i64,
}

impl Frame {
    /// Build a frame from an angle sequence.
    pub fn new(angles: &[f64], timestamp: i64) -> Result<Self, DecodeError> {
        let angles: [f64; JOINT_COUNT] = angles
            .try_into()
            .map_err(|_| DecodeError::AngleCount(angles.len()))?;
        Ok(Self { angles, timestamp })
    }

    pub fn angles(&self) -> &[f64; JOINT_COUNT] {
        &self.angles
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// One decoded message from the local IPC channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Blank message, ignored by the reader.
    Empty,
    /// The peer requested shutdown of the ingest side.
    Exit,
    /// A valid frame.
    Angles(Frame),
}

/// Decode a text message received from the engine.
///
/// Accepts a JSON object carrying an `angles` array of exactly
/// [`JOINT_COUNT`] numbers (other fields are ignored), or the literal
/// [`EXIT_SENTINEL`] in any case. The frame is stamped with `timestamp`.
pub fn decode_inbound(text: &str, timestamp: i64) -> Result<Inbound, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Inbound::Empty);
    }
    if text.eq_ignore_ascii_case(EXIT_SENTINEL) {
        return Ok(Inbound::Exit);
    }

    let value: serde_json::Value = serde_json::from_str(text)?;
    let angles = match value.get("angles") {
        None | Some(serde_json::Value::Null) => return Err(DecodeError::MissingAngles),
        Some(angles) => Vec::<f64>::deserialize(angles)?,
    };
    if angles.is_empty() {
        return Err(DecodeError::MissingAngles);
    }

    Frame::new(&angles, timestamp).map(Inbound::Angles)
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
