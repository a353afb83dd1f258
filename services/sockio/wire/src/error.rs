//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Packet has no type tag
    #[error("invalid packet format")]
    InvalidPacket,

    /// Tag byte is not part of the layer's vocabulary
    #[error("unknown packet type {0:?}")]
    UnknownType(char),

    /// Structured payload could not be serialized
    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
