//! Keepalive protocol: heartbeat frames and the heartbeat loop.
//!
//! The client pings every `ping_interval`. Any pong re-arms a liveness
//! window of `ping_interval + ping_timeout`; if the window lapses the
//! connection is considered faulted.

use crate::pump::Outbound;
use crate::signal::CloseSignal;
use bytes::Bytes;
use sockio_wire::{encode_message, EnginePacketType, Packet, SocketPacketType};
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::{debug, trace, warn};

/// Build an engine PING frame (`2`)
pub fn build_ping() -> Bytes {
    Packet::new(EnginePacketType::Ping, Bytes::new()).to_bytes()
}

/// Build an engine PONG frame (`3`)
pub fn build_pong() -> Bytes {
    Packet::new(EnginePacketType::Pong, Bytes::new()).to_bytes()
}

/// Build the socket disconnect notice (`41`)
pub fn build_close_notice() -> Bytes {
    encode_message(SocketPacketType::Disconnect, Bytes::new())
}

/// A resettable one-shot timer that never fires while disarmed
#[derive(Debug)]
pub struct Deadline {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Deadline {
    /// Create a disarmed deadline
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(Duration::ZERO)),
            armed: false,
        }
    }

    /// Arm to fire `after` from now
    pub fn arm(&mut self, after: Duration) {
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = true;
    }

    /// Push the deadline out to `after` from now
    pub fn reset(&mut self, after: Duration) {
        self.arm(after);
    }

    /// Disarm
    pub fn cancel(&mut self) {
        self.armed = false;
    }

    /// Whether the deadline is armed
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolve when an armed deadline passes; disarms on firing
    pub async fn expired(&mut self) {
        if !self.armed {
            return pending().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new()
    }
}

/// Heartbeat timings announced in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatParams {
    /// Time between pings
    pub ping_interval: Duration,
    /// Grace period for the pong on top of the interval
    pub ping_timeout: Duration,
}

impl HeartbeatParams {
    /// Length of the liveness window
    pub fn window(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

/// Why a heartbeat loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// No pong within the liveness window
    Faulted,
    /// Close signal observed
    Stopped,
}

/// Run the heartbeat of one connection epoch
pub async fn run_heartbeat(
    params: HeartbeatParams,
    outbound: Outbound,
    pong: Arc<Notify>,
    closed: CloseSignal,
) -> HeartbeatExit {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + params.ping_interval,
        params.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut deadline = Deadline::new();
    deadline.arm(params.window());

    loop {
        tokio::select! {
            biased;

            _ = closed.fired() => {
                debug!("Heartbeat stopped");
                return HeartbeatExit::Stopped;
            }

            _ = pong.notified() => {
                trace!("Pong received");
                deadline.reset(params.window());
            }

            _ = deadline.expired() => {
                warn!(
                    "No pong within {:?}; connection considered lost",
                    params.window()
                );
                return HeartbeatExit::Faulted;
            }

            _ = ticker.tick() => {
                match outbound.enqueue(build_ping()).await {
                    Ok(()) => trace!("Ping queued"),
                    Err(e) => warn!("Failed to queue ping: {}", e),
                }
            }
        }
    }
}
