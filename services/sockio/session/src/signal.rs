//! One-shot close signal shared by the tasks of a connection epoch.

use std::sync::Arc;
use tokio::sync::watch;

/// Broadcast signal raised at most once.
///
/// Every clone observes the same signal. [`CloseSignal::fire`] reports
/// whether this call was the one that raised it, which lets concurrent
/// fault detectors agree on a single owner for teardown.
#[derive(Clone, Debug)]
pub struct CloseSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    /// Create an unraised signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal; returns `true` only for the call that raised it
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Whether the signal has been raised
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is raised
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
