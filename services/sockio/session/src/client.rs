//! Client handle and connection lifecycle.
//!
//! A [`Client`] owns the callback registries, the outbound queue and the
//! reconnect supervisor for its whole lifetime. Each successful connect
//! installs a new connection epoch: one reader, one writer and one
//! heartbeat task sharing a [`CloseSignal`]. Whichever task detects a fault
//! first raises that signal and is the only one allowed to hand the client
//! to the reconnect supervisor.

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::handshake::await_open;
use crate::keepalive::{build_close_notice, run_heartbeat, HeartbeatExit, HeartbeatParams};
use crate::pump::{read_loop, write_loop, Outbound, OutboundQueue, ReadExit};
use crate::reconnect::{ReconnectOutcome, ReconnectPolicy, ReconnectSupervisor};
use crate::registry::Registry;
use crate::signal::CloseSignal;
use crate::transport::{Dialer, Transport, WsDialer};
use crate::{ClientError, TransportError};
use bytes::Bytes;
use serde::Serialize;
use sockio_wire::{encode_event, encode_message, with_ack_id, SocketPacketType};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `close` waits for the epoch's tasks to finish
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Handle to a sockio client; cheap to clone.
///
/// Dropping the last handle shuts the client down without a close notice.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    /// Configuration the client was built with
    config: ClientConfig,
    /// Websocket URL dialed on every connect attempt
    url: String,
    /// Transport factory
    dialer: Arc<dyn Dialer>,
    /// Event handlers and pending acks
    registry: Arc<Registry>,
    /// Reconnect state and the ack-id counter
    reconnect: Arc<ReconnectSupervisor>,
    /// Sending end of the client-lifetime outbound queue
    outbound: Outbound,
    /// Receiving end, handed to each epoch's writer
    queue: OutboundQueue,
    /// The live epoch, if any
    connection: Mutex<Option<Connection>>,
    /// Last epoch number handed out
    epochs: AtomicU64,
    /// Set once `close` was called
    shutdown: AtomicBool,
    /// Raised with `shutdown`; cancels reconnect loops
    shutdown_signal: CloseSignal,
}

/// One connection epoch
struct Connection {
    epoch: u64,
    sid: String,
    ping_interval: Duration,
    ping_timeout: Duration,
    closed: CloseSignal,
    /// Raised ahead of `closed` when queued frames should still be written
    drain: CloseSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    /// Connect over websocket.
    ///
    /// If the first attempt fails and reconnection is enabled, the client is
    /// returned anyway and keeps retrying in the background.
    pub async fn connect(config: ClientConfig) -> Result<Client, ClientError> {
        Self::connect_with(config, Arc::new(WsDialer)).await
    }

    /// Connect through a custom [`Dialer`]
    pub async fn connect_with(
        config: ClientConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Client, ClientError> {
        let url = config.handshake_url()?;
        let (outbound, queue) =
            Outbound::channel(config.outbound_capacity, config.enqueue_timeout);
        let policy = ReconnectPolicy {
            max_attempts: config.reconnect_attempts,
            base_delay: config.reconnect_delay,
        };

        let inner = Arc::new(Inner {
            config,
            url,
            dialer,
            registry: Arc::new(Registry::new()),
            reconnect: Arc::new(ReconnectSupervisor::new(policy)),
            outbound,
            queue,
            connection: Mutex::new(None),
            epochs: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            shutdown_signal: CloseSignal::new(),
        });

        match inner.establish().await {
            Ok(()) => {}
            Err(e) if inner.config.reconnect => {
                warn!("Initial connect failed: {}; retrying in the background", e);
                inner.spawn_reconnect();
            }
            Err(e) => return Err(e),
        }

        Ok(Client { inner })
    }

    /// Register the handler for `event`, replacing any previous one.
    ///
    /// The handler receives the JSON encoding of the event data and runs at
    /// most once; register again to receive the next occurrence.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: FnOnce(Bytes) + Send + Sync + 'static,
    {
        self.inner.registry.on(event, Box::new(handler));
    }

    /// Emit `event` with `data`
    pub async fn emit<T>(&self, event: &str, data: &T) -> Result<(), ClientError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.ensure_open()?;
        let body = encode_event(event, data)?;
        self.inner
            .outbound
            .enqueue(encode_message(SocketPacketType::Event, body))
            .await
    }

    /// Emit `event` and run `callback` with the raw payload of the server's ack
    pub async fn emit_with_ack<T, F>(
        &self,
        event: &str,
        data: &T,
        callback: F,
    ) -> Result<(), ClientError>
    where
        T: Serialize + Sync + ?Sized,
        F: FnOnce(Bytes) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let body = encode_event(event, data)?;

        let id = self.inner.reconnect.next_ack_id();
        // Registered first: the ack may arrive before enqueue returns
        self.inner.registry.register_ack(id, Box::new(callback));

        let frame = encode_message(SocketPacketType::Event, with_ack_id(id, &body));
        if let Err(e) = self.inner.outbound.enqueue(frame).await {
            self.inner.registry.cancel_ack(id);
            return Err(e);
        }
        debug!("Emitted {:?} with ack id {}", event, id);
        Ok(())
    }

    /// Close the client. Idempotent.
    ///
    /// With `send_close_notice` the server is told the socket is going away;
    /// frames queued before the call are still written.
    pub async fn close(&self, send_close_notice: bool) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown_signal.fire();

        let connection = self.inner.lock_connection().take();
        let mut connection = match connection {
            Some(connection) => connection,
            None => {
                info!("Client closed (no live connection)");
                return;
            }
        };

        if send_close_notice {
            if let Err(e) = self.inner.outbound.enqueue(build_close_notice()).await {
                warn!("Failed to queue close notice: {}", e);
            }
        }
        connection.drain.fire();
        connection.closed.fire();

        let tasks = futures::future::join_all(connection.tasks.iter_mut());
        if tokio::time::timeout(CLOSE_GRACE, tasks).await.is_err() {
            warn!(
                "Connection tasks did not stop within {:?}; aborting them",
                CLOSE_GRACE
            );
            for task in &connection.tasks {
                task.abort();
            }
        }
        info!("Client closed (sid {}, epoch {})", connection.sid, connection.epoch);
    }

    /// Session id of the live epoch
    pub fn sid(&self) -> Option<String> {
        self.inner.lock_connection().as_ref().map(|c| c.sid.clone())
    }

    /// Whether an epoch is live
    pub fn is_connected(&self) -> bool {
        self.inner.lock_connection().is_some()
    }

    /// Ping interval announced for the live epoch
    pub fn ping_interval(&self) -> Option<Duration> {
        self.inner.lock_connection().as_ref().map(|c| c.ping_interval)
    }

    /// Ping timeout announced for the live epoch
    pub fn ping_timeout(&self) -> Option<Duration> {
        self.inner.lock_connection().as_ref().map(|c| c.ping_timeout)
    }

    /// Effective connection timeout: the server's ping timeout once
    /// connected, the configured handshake timeout otherwise
    pub fn timeout(&self) -> Duration {
        self.ping_timeout().unwrap_or(self.inner.config.timeout)
    }

    /// Number of the live epoch
    pub fn epoch(&self) -> Option<u64> {
        self.inner.lock_connection().as_ref().map(|c| c.epoch)
    }

    /// Consecutive failed reconnect attempts
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.attempts()
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.url)
            .field("sid", &self.sid())
            .field("epoch", &self.epoch())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Inner {
    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one connect attempt: dial, start the pump, handshake, start the
    /// heartbeat and install the epoch
    async fn establish(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Connecting to {} (epoch {})", self.url, epoch);
        let Transport { sink, stream } = self.dialer.dial(&self.url).await?;

        let closed = CloseSignal::new();
        let drain = CloseSignal::new();
        let pong = Arc::new(Notify::new());
        let (open_tx, open_rx) = oneshot::channel();
        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.outbound.clone(),
            pong.clone(),
            open_tx,
        );

        let mut tasks = Vec::with_capacity(3);

        tasks.push({
            let weak = Arc::downgrade(self);
            let closed = closed.clone();
            tokio::spawn(async move {
                match read_loop(stream, dispatcher, closed.clone()).await {
                    ReadExit::Stopped => {}
                    ReadExit::ServerClosed => {
                        report_fault(&weak, epoch, &closed, "server closed the session")
                    }
                    ReadExit::Failed(e) => {
                        report_fault(&weak, epoch, &closed, &format!("read failed: {}", e))
                    }
                }
            })
        });

        tasks.push({
            let weak = Arc::downgrade(self);
            let closed = closed.clone();
            let drain = drain.clone();
            let queue = self.queue.clone();
            tokio::spawn(async move {
                if let Err(e) = write_loop(sink, queue, closed.clone(), drain).await {
                    report_fault(&weak, epoch, &closed, &format!("write failed: {}", e));
                }
            })
        });

        let info = match await_open(open_rx, self.config.timeout).await {
            Ok(info) => info,
            Err(e) => {
                closed.fire();
                return Err(e);
            }
        };

        let params = HeartbeatParams {
            ping_interval: info.ping_interval(),
            ping_timeout: info.ping_timeout(),
        };
        tasks.push({
            let weak = Arc::downgrade(self);
            let closed = closed.clone();
            let outbound = self.outbound.clone();
            tokio::spawn(async move {
                if run_heartbeat(params, outbound, pong, closed.clone()).await
                    == HeartbeatExit::Faulted
                {
                    report_fault(&weak, epoch, &closed, "heartbeat timed out");
                }
            })
        });

        let mut slot = self.lock_connection();
        if self.shutdown.load(Ordering::SeqCst) {
            drop(slot);
            closed.fire();
            return Err(ClientError::Closed);
        }
        if closed.is_fired() {
            // Faulted between the handshake and now
            return Err(ClientError::Transport(TransportError::Closed));
        }

        let previous = slot.replace(Connection {
            epoch,
            sid: info.sid.clone(),
            ping_interval: params.ping_interval,
            ping_timeout: params.ping_timeout,
            closed,
            drain,
            tasks,
        });
        drop(slot);

        if let Some(previous) = previous {
            debug!("Replacing epoch {}", previous.epoch);
            previous.closed.fire();
        }

        info!(
            "Connected (sid {}, epoch {}, ping interval {:?}, ping timeout {:?})",
            info.sid, epoch, params.ping_interval, params.ping_timeout
        );
        Ok(())
    }

    /// Tear down `epoch` after a fault and hand off to the reconnect
    /// supervisor. Only the caller that raises `closed` proceeds.
    fn fault(self: &Arc<Self>, epoch: u64, closed: &CloseSignal, reason: &str) {
        let was_live = {
            let mut slot = self.lock_connection();
            if !closed.fire() {
                return;
            }
            let current = slot.as_ref().map_or(false, |c| c.epoch == epoch);
            if current {
                slot.take();
            }
            current
        };

        if !was_live {
            debug!("Epoch {} failed before it was installed: {}", epoch, reason);
            return;
        }

        warn!("Connection lost (epoch {}): {}", epoch, reason);
        if self.config.reconnect && !self.shutdown.load(Ordering::SeqCst) {
            self.spawn_reconnect();
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let supervisor = self.reconnect.clone();
        let cancel = self.shutdown_signal.clone();

        tokio::spawn(async move {
            let outcome = supervisor
                .run(&cancel, || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(inner) => inner.establish().await,
                            None => Err(ClientError::Closed),
                        }
                    }
                })
                .await;

            match outcome {
                ReconnectOutcome::Reconnected => {}
                ReconnectOutcome::GaveUp => {
                    error!("Reconnect attempts exhausted; client stays disconnected")
                }
                ReconnectOutcome::Aborted => debug!("Reconnect aborted by close"),
            }
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown_signal.fire();
        let slot = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = slot.take() {
            connection.closed.fire();
        }
    }
}

fn report_fault(weak: &Weak<Inner>, epoch: u64, closed: &CloseSignal, reason: &str) {
    match weak.upgrade() {
        Some(inner) => inner.fault(epoch, closed, reason),
        None => {
            closed.fire();
        }
    }
}
