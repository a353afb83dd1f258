//! Transport pump: the outbound queue and the read/write loops of an epoch.
//!
//! Outbound frames go through a bounded queue owned by the client and are
//! written by exactly one writer task, so frames reach the transport in
//! enqueue order. Inbound frames are read by exactly one reader task and
//! handed to the [`Dispatcher`] in arrival order.

use crate::dispatch::{Dispatcher, Route};
use crate::signal::CloseSignal;
use crate::transport::{FrameSink, FrameStream};
use crate::{ClientError, TransportError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

/// Receiving end of the outbound queue, handed from epoch to epoch
pub type OutboundQueue = Arc<Mutex<mpsc::Receiver<Bytes>>>;

/// Sending end of the outbound queue
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
    timeout: Duration,
}

impl Outbound {
    /// Create a queue holding up to `capacity` frames
    pub fn channel(capacity: usize, timeout: Duration) -> (Outbound, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Outbound { tx, timeout }, Arc::new(Mutex::new(rx)))
    }

    /// Queue a frame, waiting at most the configured timeout for space
    pub async fn enqueue(&self, frame: Bytes) -> Result<(), ClientError> {
        match tokio::time::timeout(self.timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::WriteTimeout),
        }
    }

    /// Queue a frame only if there is room right now
    pub fn try_enqueue(&self, frame: Bytes) -> Result<(), ClientError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }
}

/// Why a read loop ended
#[derive(Debug)]
pub enum ReadExit {
    /// Close signal observed
    Stopped,
    /// Server sent an engine close packet
    ServerClosed,
    /// Transport failed or reached end of stream
    Failed(TransportError),
}

/// Read frames until the transport fails or the epoch closes
pub async fn read_loop(
    mut stream: Box<dyn FrameStream>,
    mut dispatcher: Dispatcher,
    closed: CloseSignal,
) -> ReadExit {
    loop {
        tokio::select! {
            _ = closed.fired() => {
                debug!("Read loop stopped");
                return ReadExit::Stopped;
            }

            frame = stream.next_frame() => {
                match frame {
                    Some(Ok(frame)) => {
                        trace!("Received frame: {}", String::from_utf8_lossy(&frame));
                        if let Route::Close = dispatcher.handle_frame(frame) {
                            return ReadExit::ServerClosed;
                        }
                    }
                    Some(Err(e)) => return ReadExit::Failed(e),
                    None => return ReadExit::Failed(TransportError::Closed),
                }
            }
        }
    }
}

/// Write queued frames until the epoch closes.
///
/// If `drain` was raised before `closed`, frames still queued are written
/// before the sink is closed. Otherwise they stay queued for the next epoch
/// and a send still in flight is abandoned, which releases the queue even
/// when the transport has stopped accepting writes.
pub async fn write_loop(
    mut sink: Box<dyn FrameSink>,
    queue: OutboundQueue,
    closed: CloseSignal,
    drain: CloseSignal,
) -> Result<(), TransportError> {
    // The previous epoch's writer may still hold the queue for a moment
    let mut rx = tokio::select! {
        biased;

        guard = queue.lock() => guard,
        _ = halted(&closed, &drain) => return Ok(()),
    };

    loop {
        let frame = tokio::select! {
            biased;

            _ = closed.fired() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        trace!("Writing frame: {}", String::from_utf8_lossy(&frame));
        tokio::select! {
            biased;

            result = sink.send(frame) => result?,
            _ = halted(&closed, &drain) => {
                debug!("Write loop abandoned an in-flight frame");
                return Ok(());
            }
        }
    }

    if drain.is_fired() {
        while let Ok(frame) = rx.try_recv() {
            trace!("Draining frame: {}", String::from_utf8_lossy(&frame));
            sink.send(frame).await?;
        }
    }
    drop(rx);

    debug!("Write loop stopped");
    if let Err(e) = sink.close().await {
        warn!("Failed to close transport: {}", e);
    }
    Ok(())
}

/// Resolves once the epoch closes without a drain request
async fn halted(closed: &CloseSignal, drain: &CloseSignal) {
    closed.fired().await;
    if drain.is_fired() {
        std::future::pending::<()>().await;
    }
}
