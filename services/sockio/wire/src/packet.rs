//! Packet types and the shared encode/decode routine.
//!
//! Both framing layers use the same layout: one ASCII type tag followed by
//! an opaque payload. Only the tag vocabulary differs, so the layers are
//! two [`PacketType`] implementations over one generic [`Packet`].

use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// A tag vocabulary for one framing layer
pub trait PacketType: Copy + Eq + std::fmt::Debug + Sized + 'static {
    /// Every tag of the layer, in tag order
    const ALL: &'static [Self];

    /// The ASCII byte written on the wire
    fn tag(self) -> u8;

    /// Map a wire byte back to a tag
    fn from_tag(tag: u8) -> Result<Self, WireError> {
        Self::ALL
            .iter()
            .copied()
            .find(|typ| typ.tag() == tag)
            .ok_or(WireError::UnknownType(char::from(tag)))
    }
}

/// Outer (engine) layer packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePacketType {
    /// Handshake carrying the session parameters
    Open,
    /// Transport is closing
    Close,
    /// Liveness probe
    Ping,
    /// Liveness probe response
    Pong,
    /// Carries a socket-layer packet
    Message,
}

impl PacketType for EnginePacketType {
    const ALL: &'static [Self] = &[
        EnginePacketType::Open,
        EnginePacketType::Close,
        EnginePacketType::Ping,
        EnginePacketType::Pong,
        EnginePacketType::Message,
    ];

    fn tag(self) -> u8 {
        match self {
            EnginePacketType::Open => b'0',
            EnginePacketType::Close => b'1',
            EnginePacketType::Ping => b'2',
            EnginePacketType::Pong => b'3',
            EnginePacketType::Message => b'4',
        }
    }
}

/// Inner (socket) layer packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketPacketType {
    /// Namespace connect
    Connect,
    /// Namespace disconnect
    Disconnect,
    /// Named event `[name, payload]`
    Event,
    /// Acknowledgement response
    Ack,
    /// Server-side error
    Error,
}

impl PacketType for SocketPacketType {
    const ALL: &'static [Self] = &[
        SocketPacketType::Connect,
        SocketPacketType::Disconnect,
        SocketPacketType::Event,
        SocketPacketType::Ack,
        SocketPacketType::Error,
    ];

    fn tag(self) -> u8 {
        match self {
            SocketPacketType::Connect => b'0',
            SocketPacketType::Disconnect => b'1',
            SocketPacketType::Event => b'2',
            SocketPacketType::Ack => b'3',
            SocketPacketType::Error => b'4',
        }
    }
}

impl TryFrom<u8> for EnginePacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        Self::from_tag(value)
    }
}

impl TryFrom<u8> for SocketPacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        Self::from_tag(value)
    }
}

/// Payload appended after the type tag
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload, the packet is the tag alone
    None,
    /// Appended verbatim
    Text(String),
    /// Appended raw
    Binary(Bytes),
    /// Serialized as JSON first
    Json(serde_json::Value),
}

impl Payload {
    /// Build a JSON payload from any serializable value
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, WireError> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    fn into_bytes(self) -> Result<Bytes, WireError> {
        match self {
            Payload::None => Ok(Bytes::new()),
            Payload::Text(text) => Ok(Bytes::from(text)),
            Payload::Binary(bytes) => Ok(bytes),
            Payload::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Binary(value)
    }
}

/// A decoded packet of either layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<T> {
    /// Type tag
    pub typ: T,
    /// Everything after the tag (possibly empty)
    pub payload: Bytes,
}

impl<T: PacketType> Packet<T> {
    /// Create a packet from a tag and an already encoded payload
    pub fn new(typ: T, payload: Bytes) -> Self {
        Self { typ, payload }
    }

    /// Encode the packet to a contiguous buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.typ.tag());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode one packet; the payload shares the input buffer
    pub fn decode(data: Bytes) -> Result<Self, WireError> {
        let (tag, payload) = decode(data)?;
        Ok(Self {
            typ: T::from_tag(tag)?,
            payload,
        })
    }
}

/// Prepend `tag` to the encoded payload
pub fn encode(tag: u8, payload: Payload) -> Result<Bytes, WireError> {
    let body = payload.into_bytes()?;
    let mut buf = BytesMut::with_capacity(1 + body.len());
    buf.put_u8(tag);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Split a raw frame into its tag byte and payload
pub fn decode(data: Bytes) -> Result<(u8, Bytes), WireError> {
    match data.first() {
        Some(&tag) => Ok((tag, data.slice(1..))),
        None => Err(WireError::InvalidPacket),
    }
}

/// Wrap a socket packet inside an engine `message` packet
pub fn encode_message(typ: SocketPacketType, payload: Bytes) -> Bytes {
    let inner = Packet::new(typ, payload).to_bytes();
    Packet::new(EnginePacketType::Message, inner).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: PacketType>(payload: &'static [u8]) {
        for &typ in T::ALL {
            let encoded = Packet::new(typ, Bytes::from_static(payload)).to_bytes();
            let decoded = Packet::<T>::decode(encoded).unwrap();
            assert_eq!(decoded.typ, typ);
            assert_eq!(decoded.payload.as_ref(), payload);
        }
    }

    #[test]
    fn test_engine_roundtrip() {
        roundtrip::<EnginePacketType>(b"");
        roundtrip::<EnginePacketType>(br#"{"sid":"abc","pingInterval":25000}"#);
        roundtrip::<EnginePacketType>(&[0x00, 0xff, b'4', b'2']);
    }

    #[test]
    fn test_socket_roundtrip() {
        roundtrip::<SocketPacketType>(b"");
        roundtrip::<SocketPacketType>(br#"12["message","Hello"]"#);
        roundtrip::<SocketPacketType>(&[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decode_empty_is_invalid() {
        assert!(matches!(decode(Bytes::new()), Err(WireError::InvalidPacket)));
        assert!(matches!(
            Packet::<EnginePacketType>::decode(Bytes::new()),
            Err(WireError::InvalidPacket)
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let err = Packet::<SocketPacketType>::decode(Bytes::from_static(b"9xyz")).unwrap_err();
        assert!(matches!(err, WireError::UnknownType('9')));

        // Untyped decode accepts any tag
        let (tag, payload) = decode(Bytes::from_static(b"9xyz")).unwrap();
        assert_eq!(tag, b'9');
        assert_eq!(payload.as_ref(), b"xyz");
    }

    #[test]
    fn test_encode_payload_kinds() {
        assert_eq!(encode(b'2', Payload::None).unwrap().as_ref(), b"2");
        assert_eq!(encode(b'4', Payload::from("hi")).unwrap().as_ref(), b"4hi");
        assert_eq!(
            encode(b'4', Payload::Binary(Bytes::from_static(&[1, 2]))).unwrap().as_ref(),
            &[b'4', 1, 2]
        );
        let json = Payload::json(&vec!["a", "b"]).unwrap();
        assert_eq!(encode(b'2', json).unwrap().as_ref(), br#"2["a","b"]"#);
    }

    #[test]
    fn test_tag_bytes() {
        assert_eq!(EnginePacketType::try_from(b'0').unwrap(), EnginePacketType::Open);
        assert_eq!(EnginePacketType::try_from(b'4').unwrap(), EnginePacketType::Message);
        assert_eq!(SocketPacketType::try_from(b'3').unwrap(), SocketPacketType::Ack);
        assert_eq!(SocketPacketType::Error.tag(), b'4');
    }

    #[test]
    fn test_encode_message_nests_layers() {
        let frame = encode_message(SocketPacketType::Disconnect, Bytes::new());
        assert_eq!(frame.as_ref(), b"41");

        let outer = Packet::<EnginePacketType>::decode(frame).unwrap();
        assert_eq!(outer.typ, EnginePacketType::Message);
        let inner = Packet::<SocketPacketType>::decode(outer.payload).unwrap();
        assert_eq!(inner.typ, SocketPacketType::Disconnect);
        assert!(inner.payload.is_empty());
    }
}
