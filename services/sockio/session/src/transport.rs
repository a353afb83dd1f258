//! Transport seam for sockio sessions.
//!
//! The session layer only needs an ordered, message-oriented duplex
//! channel. [`Dialer`] produces one as a [`FrameSink`]/[`FrameStream`]
//! pair; [`WsDialer`] is the websocket implementation used in production.

use crate::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// Outbound half of a transport
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a transport
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame; `None` once the remote side has closed
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>>;
}

/// An established duplex frame channel
pub struct Transport {
    /// Write half
    pub sink: Box<dyn FrameSink>,
    /// Read half
    pub stream: Box<dyn FrameStream>,
}

/// Opens transports to a URL
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Dial `url` and return the established channel
    async fn dial(&self, url: &str) -> Result<Transport, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket dialer backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &str) -> Result<Transport, TransportError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Dial(format!("{}: {}", url, e)))?;
        debug!("Websocket upgraded (status {})", response.status());

        let (sink, stream) = ws.split();
        Ok(Transport {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsFrames(stream)),
        })
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        // Protocol frames are text; anything that is not UTF-8 goes out binary
        let message = match String::from_utf8(frame.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsFrames(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WsFrames {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(frame)) => {
                    debug!("Websocket close frame received: {:?}", frame);
                    return None;
                }
                Ok(other) => {
                    // Websocket-level ping/pong is answered by tungstenite
                    trace!("Skipping control message: {:?}", other);
                }
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_ws_dial_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Text(r#"0{"sid":"s1"}"#.to_string()))
                .await
                .unwrap();
            // Echo one frame back
            if let Some(Ok(msg)) = ws.next().await {
                ws.send(msg).await.unwrap();
            }
        });

        let url = format!("ws://{}/?EIO=3&transport=websocket", addr);
        let mut transport = WsDialer.dial(&url).await.unwrap();

        let first = transport.stream.next_frame().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), br#"0{"sid":"s1"}"#);

        transport.sink.send(Bytes::from_static(b"2")).await.unwrap();
        let echoed = transport.stream.next_frame().await.unwrap().unwrap();
        assert_eq!(echoed.as_ref(), b"2");
    }

    #[tokio::test]
    async fn test_ws_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("ws://{}/?EIO=3&transport=websocket", addr);
        let result = WsDialer.dial(&url).await;
        assert!(matches!(result, Err(TransportError::Dial(_))));
    }
}
