//! Packet framing for the two nested layers of the sockio protocol.
//!
//! This crate provides the low-level wire implementation shared by every
//! sockio connection: the single-character type tags of both framing
//! layers, the generic encode/decode routine, and the helpers for event
//! arrays and acknowledgement ids carried inside socket packets.
//!
//! ## Wire Format
//!
//! ```text
//! engine packet:  +-----+------------------------------+
//!                 | tag | payload (0..N bytes)         |
//!                 +-----+------------------------------+
//!                          |
//!                          | tag == '4' (message)
//!                          v
//! socket packet:  +-----+--------------+---------------+
//!                 | tag | ack id (opt) | JSON array    |
//!                 +-----+--------------+---------------+
//! ```
//!
//! An event emitted with ack id 12 therefore travels as
//! `4212["name",{"k":"v"}]`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod packet;

// Re-export main types
pub use error::WireError;
pub use event::{encode_event, parse_event, split_ack_id, with_ack_id};
pub use packet::{
    decode, encode, encode_message, EnginePacketType, Packet, PacketType, Payload,
    SocketPacketType,
};
