//! Messages sent over the outbound WebSocket link.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::{Frame, JOINT_COUNT};

/// Outbound message understood by the device firmware.
///
/// Serialized with a `type` tag:
/// ```text
/// {"type":"joint_angles","angles":[...18 numbers...],"timestamp":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    JointAngles {
        angles: [f64; JOINT_COUNT],
        timestamp: i64,
    },
}

impl From<&Frame> for WireMessage {
    fn from(frame: &Frame) -> Self {
        WireMessage::JointAngles {
            angles: *frame.angles(),
            timestamp: frame.timestamp(),
        }
    }
}

/// Encode a frame as the JSON text payload sent to the device.
pub fn encode_frame(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(&WireMessage::from(frame))?)
}

/// Decode a payload produced by [`encode_frame`].
pub fn decode_wire(text: &str) -> Result<WireMessage> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_shape() {
        let frame = Frame::new(&[2.0; JOINT_COUNT], 1_700_000_000_123).unwrap();
        let text = encode_frame(&frame).unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "joint_angles");
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["angles"].as_array().unwrap().len(), JOINT_COUNT);
        assert_eq!(value["angles"][5], 2.0);
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_decode_matches_frame() {
        let frame = Frame::new(&[0.25; JOINT_COUNT], 7).unwrap();
        let text = encode_frame(&frame).unwrap();

        let WireMessage::JointAngles { angles, timestamp } = decode_wire(&text).unwrap();
        assert_eq!(&angles, frame.angles());
        assert_eq!(timestamp, 7);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_wire(r#"{"type":"heartbeat"}"#).is_err());
    }
}
