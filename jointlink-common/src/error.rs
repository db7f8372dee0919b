use thiserror::Error;

use crate::frame::JOINT_COUNT;

/// Common error type for JointLink components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons an inbound message is rejected before it becomes a [`Frame`](crate::Frame).
///
/// None of these are fatal: the ingest loop logs them and keeps reading.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no angles found in message")]
    MissingAngles,

    #[error("expected {JOINT_COUNT} angles, received {0}")]
    AngleCount(usize),
}

/// Result type alias using JointLink's Error.
pub type Result<T> = std::result::Result<T, Error>;
