//! Inbound packet routing.
//!
//! The reader task hands every frame to a [`Dispatcher`], which decodes the
//! engine layer, answers server pings, wakes the heartbeat on pongs and
//! routes socket-layer events and acks to the [`Registry`].

use crate::keepalive;
use crate::pump::Outbound;
use crate::registry::Registry;
use bytes::Bytes;
use sockio_wire::{parse_event, split_ack_id, EnginePacketType, Packet, SocketPacketType};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

/// What the reader should do after a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Keep reading
    Continue,
    /// Server closed the session
    Close,
}

/// Per-epoch inbound router
pub struct Dispatcher {
    registry: Arc<Registry>,
    outbound: Outbound,
    pong: Arc<Notify>,
    handshake: Option<oneshot::Sender<Bytes>>,
}

impl Dispatcher {
    /// Create a dispatcher. The first `open` packet is forwarded to `handshake`.
    pub fn new(
        registry: Arc<Registry>,
        outbound: Outbound,
        pong: Arc<Notify>,
        handshake: oneshot::Sender<Bytes>,
    ) -> Self {
        Self {
            registry,
            outbound,
            pong,
            handshake: Some(handshake),
        }
    }

    /// Handle one inbound frame
    pub fn handle_frame(&mut self, frame: Bytes) -> Route {
        let packet = match Packet::<EnginePacketType>::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Discarding undecodable frame: {}", e);
                return Route::Continue;
            }
        };

        match packet.typ {
            EnginePacketType::Open => match self.handshake.take() {
                Some(tx) => {
                    // Handshake waiter may have given up already
                    let _ = tx.send(packet.payload);
                }
                None => debug!("Ignoring repeated open packet"),
            },
            EnginePacketType::Close => {
                debug!("Server closed the session");
                return Route::Close;
            }
            EnginePacketType::Ping => {
                // Never wait for queue space on the read path
                if let Err(e) = self.outbound.try_enqueue(keepalive::build_pong()) {
                    warn!("Dropping pong: {}", e);
                }
            }
            EnginePacketType::Pong => self.pong.notify_one(),
            EnginePacketType::Message => self.handle_message(packet.payload),
        }

        Route::Continue
    }

    fn handle_message(&self, payload: Bytes) {
        if payload.is_empty() {
            debug!("Ignoring empty message packet");
            return;
        }

        let packet = match Packet::<SocketPacketType>::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Discarding undecodable socket packet: {}", e);
                return;
            }
        };

        match packet.typ {
            SocketPacketType::Event => {
                let (_, body) = split_ack_id(&packet.payload);
                self.deliver_event(&body);
            }
            SocketPacketType::Ack => {
                let (id, body) = split_ack_id(&packet.payload);
                if id == 0 {
                    // Ack without an id carries a plain event
                    self.deliver_event(&body);
                } else if !self.registry.complete_ack(id, body) {
                    debug!("No pending ack for id {}", id);
                }
            }
            SocketPacketType::Error => {
                warn!(
                    "Server reported error: {}",
                    String::from_utf8_lossy(&packet.payload)
                );
            }
            SocketPacketType::Connect | SocketPacketType::Disconnect => {
                debug!("Ignoring socket {:?} packet", packet.typ);
            }
        }
    }

    fn deliver_event(&self, body: &[u8]) {
        match parse_event(body) {
            Some((name, data)) => {
                if !self.registry.dispatch_event(&name, data) {
                    debug!("No handler for event {:?}", name);
                }
            }
            None => debug!(
                "Discarding malformed event: {}",
                String::from_utf8_lossy(body)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::OutboundQueue;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<Registry>,
        queue: OutboundQueue,
        pong: Arc<Notify>,
        open_rx: oneshot::Receiver<Bytes>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(Registry::new());
        let (outbound, queue) = Outbound::channel(8, Duration::from_secs(1));
        let pong = Arc::new(Notify::new());
        let (open_tx, open_rx) = oneshot::channel();
        Fixture {
            dispatcher: Dispatcher::new(registry.clone(), outbound, pong.clone(), open_tx),
            registry,
            queue,
            pong,
            open_rx,
        }
    }

    fn capture(registry: &Registry, event: &str) -> Arc<Mutex<Vec<Bytes>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.on(event, Box::new(move |data| sink.lock().unwrap().push(data)));
        seen
    }

    #[tokio::test]
    async fn test_event_reaches_handler() {
        let mut f = fixture();
        let seen = capture(&f.registry, "greet");

        let route = f.dispatcher.handle_frame(Bytes::from_static(br#"42["greet","hi"]"#));
        assert_eq!(route, Route::Continue);
        assert_eq!(seen.lock().unwrap().as_slice(), &[Bytes::from_static(b"\"hi\"")]);
    }

    #[tokio::test]
    async fn test_event_with_ack_id_still_dispatched() {
        let mut f = fixture();
        let seen = capture(&f.registry, "greet");

        f.dispatcher.handle_frame(Bytes::from_static(br#"4217["greet",{"a":1}]"#));
        assert_eq!(seen.lock().unwrap().as_slice(), &[Bytes::from_static(br#"{"a":1}"#)]);
    }

    #[tokio::test]
    async fn test_ack_completes_callback_verbatim() {
        let mut f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.registry
            .register_ack(1, Box::new(move |data| sink.lock().unwrap().push(data)));

        f.dispatcher.handle_frame(Bytes::from_static(br#"431{"foo":1}"#));
        f.dispatcher.handle_frame(Bytes::from_static(br#"431{"foo":1}"#));

        assert_eq!(seen.lock().unwrap().as_slice(), &[Bytes::from_static(br#"{"foo":1}"#)]);
        assert_eq!(f.registry.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_ack_without_id_is_an_event() {
        let mut f = fixture();
        let seen = capture(&f.registry, "status");

        f.dispatcher.handle_frame(Bytes::from_static(br#"43["status","ok"]"#));
        assert_eq!(seen.lock().unwrap().as_slice(), &[Bytes::from_static(b"\"ok\"")]);
    }

    #[tokio::test]
    async fn test_ping_queues_pong() {
        let mut f = fixture();
        f.dispatcher.handle_frame(Bytes::from_static(b"2"));

        let mut rx = f.queue.lock().await;
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"3"));
    }

    #[tokio::test]
    async fn test_ping_with_full_queue_drops_pong() {
        let registry = Arc::new(Registry::new());
        let (outbound, queue) = Outbound::channel(1, Duration::from_secs(5));
        let (open_tx, _open_rx) = oneshot::channel();
        let mut dispatcher =
            Dispatcher::new(registry, outbound.clone(), Arc::new(Notify::new()), open_tx);
        outbound.enqueue(Bytes::from_static(b"42[\"x\"]")).await.unwrap();

        // Returns at once instead of waiting out the enqueue timeout
        let route = tokio::time::timeout(Duration::from_millis(100), async {
            dispatcher.handle_frame(Bytes::from_static(b"2"))
        })
        .await
        .unwrap();
        assert_eq!(route, Route::Continue);

        let mut rx = queue.lock().await;
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"42[\"x\"]"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pong_wakes_heartbeat() {
        let mut f = fixture();
        f.dispatcher.handle_frame(Bytes::from_static(b"3"));
        tokio::time::timeout(Duration::from_secs(1), f.pong.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_forwarded_once() {
        let mut f = fixture();
        f.dispatcher.handle_frame(Bytes::from_static(br#"0{"sid":"a"}"#));
        f.dispatcher.handle_frame(Bytes::from_static(br#"0{"sid":"b"}"#));

        assert_eq!(f.open_rx.await.unwrap(), Bytes::from_static(br#"{"sid":"a"}"#));
    }

    #[tokio::test]
    async fn test_close_and_garbage() {
        let mut f = fixture();
        assert_eq!(f.dispatcher.handle_frame(Bytes::new()), Route::Continue);
        assert_eq!(f.dispatcher.handle_frame(Bytes::from_static(b"9xyz")), Route::Continue);
        assert_eq!(f.dispatcher.handle_frame(Bytes::from_static(b"4")), Route::Continue);
        assert_eq!(
            f.dispatcher.handle_frame(Bytes::from_static(b"44\"bad\"")),
            Route::Continue
        );
        assert_eq!(f.dispatcher.handle_frame(Bytes::from_static(b"1")), Route::Close);
    }
}
