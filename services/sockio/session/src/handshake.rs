//! Handshake for sockio sessions.
//!
//! Every connect attempt waits for the server's engine `open` packet and
//! takes the session id and heartbeat timings from its JSON payload.

use crate::{ClientError, TransportError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Session parameters announced by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeInfo {
    /// Session id
    pub sid: String,
    /// Transports the server could upgrade to (informational)
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Ping interval in milliseconds
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,
    /// Ping timeout in milliseconds
    #[serde(rename = "pingTimeout")]
    pub ping_timeout: u64,
}

impl HandshakeInfo {
    /// Parse the payload of an `open` packet
    pub fn parse(payload: &[u8]) -> Result<Self, ClientError> {
        let info: HandshakeInfo = serde_json::from_slice(payload)
            .map_err(|e| ClientError::Handshake(format!("invalid open payload: {}", e)))?;

        if info.ping_interval == 0 {
            return Err(ClientError::Handshake(
                "server announced a zero ping interval".to_string(),
            ));
        }
        Ok(info)
    }

    /// Ping interval as a duration
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// Ping timeout as a duration
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

/// Wait for the open payload forwarded by the reader task.
///
/// A zero `timeout` waits without bound.
pub async fn await_open(
    open_rx: oneshot::Receiver<Bytes>,
    timeout: Duration,
) -> Result<HandshakeInfo, ClientError> {
    let received = if timeout.is_zero() {
        open_rx.await
    } else {
        tokio::time::timeout(timeout, open_rx)
            .await
            .map_err(|_| ClientError::HandshakeTimeout)?
    };

    // Sender dropped: the reader ended before the server said hello
    let payload = received.map_err(|_| ClientError::Transport(TransportError::Closed))?;
    debug!("Received open packet: {}", String::from_utf8_lossy(&payload));
    HandshakeInfo::parse(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &[u8] = br#"{"sid":"a721642c-b2c8-431f-81b6-e264e01c9167","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":600000}"#;

    #[test]
    fn test_parse_open_payload() {
        let info = HandshakeInfo::parse(OPEN).unwrap();
        assert_eq!(info.sid, "a721642c-b2c8-431f-81b6-e264e01c9167");
        assert_eq!(info.upgrades, vec!["websocket".to_string()]);
        assert_eq!(info.ping_interval(), Duration::from_secs(25));
        assert_eq!(info.ping_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let info = HandshakeInfo::parse(
            br#"{"sid":"x","pingInterval":1000,"pingTimeout":500,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert!(info.upgrades.is_empty());
        assert_eq!(info.ping_timeout, 500);
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        assert!(matches!(
            HandshakeInfo::parse(b"not-json"),
            Err(ClientError::Handshake(_))
        ));
        assert!(matches!(
            HandshakeInfo::parse(br#"{"pingInterval":1000,"pingTimeout":500}"#),
            Err(ClientError::Handshake(_))
        ));
        assert!(matches!(
            HandshakeInfo::parse(br#"{"sid":"x","pingInterval":0,"pingTimeout":500}"#),
            Err(ClientError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn test_await_open_delivers_payload() {
        let (tx, rx) = oneshot::channel();
        tx.send(Bytes::from_static(OPEN)).unwrap();
        let info = await_open(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(info.ping_interval, 25000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_open_times_out() {
        let (_tx, rx) = oneshot::channel::<Bytes>();
        let result = await_open(rx, Duration::from_secs(3)).await;
        assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_await_open_reader_gone() {
        let (tx, rx) = oneshot::channel::<Bytes>();
        drop(tx);
        let result = await_open(rx, Duration::from_secs(3)).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::Closed))
        ));
    }
}
