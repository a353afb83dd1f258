//! Client for the sockio real-time messaging protocol.
//!
//! Re-exports the public API of the workspace crates:
//!
//! - [`sockio_wire`]: packet framing for the engine and socket layers
//! - [`sockio_session`]: the client, its heartbeat and reconnection

#![warn(missing_docs)]

pub use sockio_session::{
    Client, ClientConfig, ClientError, Dialer, FrameSink, FrameStream, HandshakeInfo,
    ProtocolVersion, Transport, TransportError, WsDialer,
};
pub use sockio_wire::{EnginePacketType, Packet, PacketType, Payload, SocketPacketType, WireError};

pub use sockio_session as session;
pub use sockio_wire as wire;
