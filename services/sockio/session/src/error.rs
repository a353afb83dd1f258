//! Error types for sockio sessions.

use sockio_wire::WireError;
use thiserror::Error;

/// Errors raised by the transport seam
#[derive(Error, Debug)]
pub enum TransportError {
    /// Dial or upgrade failed
    #[error("dial failed: {0}")]
    Dial(String),

    /// Read or write on an established transport failed
    #[error("transport i/o failed: {0}")]
    Io(String),

    /// Transport closed by the remote side
    #[error("transport closed")]
    Closed,
}

/// Errors surfaced by the client API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration has no host
    #[error("host cannot be empty")]
    EmptyHost,

    /// Host is not a usable http(s)/ws(s) URL
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// Outbound packet could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[from] WireError),

    /// Outbound queue did not accept the frame in time
    #[error("write operation timed out")]
    WriteTimeout,

    /// Outbound queue had no room for a frame that cannot wait
    #[error("outbound queue is full")]
    QueueFull,

    /// Transport failure during connect
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Open packet missing or unusable
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// No open packet before the connection timeout
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Client was closed by the caller
    #[error("connection closed")]
    Closed,
}
