//! Websocket sessions, heartbeat, event dispatch and reconnection for sockio.
//!
//! This crate drives the lifecycle of a sockio client connection: dialing
//! the websocket transport, the open handshake, the ping/pong heartbeat,
//! routing of inbound events and acknowledgements, and reconnection with
//! linear backoff after faults.
//!
//! ## Features
//!
//! - **Transport seam**: [`Dialer`] trait with a websocket implementation
//! - **Handshake**: session id and heartbeat timings from the `open` packet
//! - **Heartbeat**: periodic pings with a pong deadline
//! - **Dispatch**: one-shot event handlers and ack callbacks
//! - **Auto-reconnect**: linear backoff capped at 30 seconds
//!
//! ## Example
//!
//! ```rust,no_run
//! use sockio_session::{Client, ClientConfig};
//!
//! # async fn example() -> Result<(), sockio_session::ClientError> {
//! let mut config = ClientConfig::new("http://localhost:3000");
//! config.path = "socket.io".to_string();
//!
//! let client = Client::connect(config).await?;
//!
//! client.on("greet", |data| {
//!     println!("greet: {}", String::from_utf8_lossy(&data));
//! });
//!
//! client
//!     .emit_with_ack("message", "Hello", |ack| {
//!         println!("ack: {}", String::from_utf8_lossy(&ack));
//!     })
//!     .await?;
//!
//! client.close(true).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod pump;
pub mod reconnect;
pub mod registry;
pub mod signal;
pub mod transport;

// Re-export main types
pub use client::Client;
pub use config::{ClientConfig, ProtocolVersion, DEFAULT_ENQUEUE_TIMEOUT, DEFAULT_OUTBOUND_CAPACITY};
pub use dispatch::{Dispatcher, Route};
pub use error::{ClientError, TransportError};
pub use handshake::{await_open, HandshakeInfo};
pub use keepalive::{
    build_close_notice, build_ping, build_pong, run_heartbeat, Deadline, HeartbeatExit,
    HeartbeatParams,
};
pub use pump::{read_loop, write_loop, Outbound, OutboundQueue, ReadExit};
pub use reconnect::{ReconnectOutcome, ReconnectPolicy, ReconnectSupervisor, MAX_RECONNECT_DELAY};
pub use registry::{AckCallback, EventHandler, Registry};
pub use signal::CloseSignal;
pub use transport::{Dialer, FrameSink, FrameStream, Transport, WsDialer};
