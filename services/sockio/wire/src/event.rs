//! Event arrays and acknowledgement ids inside socket packets.

use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// Encode `[name, data]` as the JSON body of an event packet
pub fn encode_event<T: Serialize + ?Sized>(name: &str, data: &T) -> Result<Bytes, WireError> {
    let body = serde_json::to_vec(&(name, data))?;
    Ok(Bytes::from(body))
}

/// Prefix an event body with its decimal ack id, no separator
pub fn with_ack_id(id: u64, body: &[u8]) -> Bytes {
    let digits = id.to_string();
    let mut buf = BytesMut::with_capacity(digits.len() + body.len());
    buf.put_slice(digits.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

/// Split the leading decimal id off a socket packet payload.
///
/// Returns id 0 when there is no parseable leading integer; the digits
/// are still consumed in that case.
pub fn split_ack_id(data: &Bytes) -> (u64, Bytes) {
    let digits = data.iter().take_while(|b| b.is_ascii_digit()).count();
    let rest = data.slice(digits..);
    let id = std::str::from_utf8(&data[..digits])
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    (id, rest)
}

/// Parse an event array into its name and the JSON encoding of its data.
///
/// A missing data element decodes as `null`.
pub fn parse_event(data: &[u8]) -> Option<(String, Bytes)> {
    let items: Vec<Value> = match serde_json::from_slice(data) {
        Ok(items) => items,
        Err(e) => {
            trace!("event body is not a JSON array: {}", e);
            return None;
        }
    };

    let name = items.first()?.as_str()?.to_string();
    let payload = serde_json::to_vec(items.get(1).unwrap_or(&Value::Null)).ok()?;
    Some((name, Bytes::from(payload)))
}
