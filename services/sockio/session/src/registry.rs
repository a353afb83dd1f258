//! Event handler and acknowledgement callback registries.
//!
//! Both maps are touched by the reader task (dispatch) and by arbitrary
//! caller contexts (`on`/`emit`), so they are lock-protected. Entries are
//! removed before their callback runs: callbacks execute outside the map
//! locks and may freely register new handlers.

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use tracing::debug;

/// Handler for a named event, invoked with the JSON encoding of its data
pub type EventHandler = Box<dyn FnOnce(Bytes) + Send + Sync + 'static>;

/// Callback for an acknowledgement, invoked with the raw ack payload
pub type AckCallback = Box<dyn FnOnce(Bytes) + Send + Sync + 'static>;

/// Callback registries owned by a client
#[derive(Default)]
pub struct Registry {
    events: DashMap<String, EventHandler>,
    acks: DashMap<u64, AckCallback>,
}

impl Registry {
    /// Create empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `event`, replacing any previous one
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) {
        let event = event.into();
        if self.events.insert(event.clone(), handler).is_some() {
            debug!("Replaced handler for event {:?}", event);
        }
    }

    /// Deliver an event; the handler is removed (one-shot delivery)
    pub fn dispatch_event(&self, event: &str, payload: Bytes) -> bool {
        match self.events.remove(event) {
            Some((_, handler)) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Whether a handler is registered for `event`
    pub fn has_handler(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// Register the callback for ack `id`
    pub fn register_ack(&self, id: u64, callback: AckCallback) {
        self.acks.insert(id, callback);
    }

    /// Complete ack `id`; unknown ids are a no-op returning `false`
    pub fn complete_ack(&self, id: u64, payload: Bytes) -> bool {
        match self.acks.remove(&id) {
            Some((_, callback)) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    /// Drop the callback for ack `id` without invoking it
    pub fn cancel_ack(&self, id: u64) -> bool {
        self.acks.remove(&id).is_some()
    }

    /// Number of acks awaiting a response
    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("events", &self.events.len())
            .field("acks", &self.acks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_event_handler_is_one_shot() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        registry.on(
            "greet",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.has_handler("greet"));
        assert!(registry.dispatch_event("greet", Bytes::from_static(b"\"hi\"")));
        assert!(!registry.dispatch_event("greet", Bytes::from_static(b"\"hi\"")));
        assert!(!registry.has_handler("greet"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ack_completes_once() {
        let registry = Registry::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        registry.register_ack(
            1,
            Box::new(move |payload| sink.lock().unwrap().push(payload)),
        );
        assert_eq!(registry.pending_acks(), 1);

        assert!(!registry.complete_ack(2, Bytes::from_static(b"{}")));
        assert!(registry.complete_ack(1, Bytes::from_static(br#"{"foo":1}"#)));
        assert!(!registry.complete_ack(1, Bytes::from_static(br#"{"foo":1}"#)));

        assert_eq!(registry.pending_acks(), 0);
        assert_eq!(
            received.lock().unwrap().as_slice(),
            &[Bytes::from_static(br#"{"foo":1}"#)]
        );
    }

    #[test]
    fn test_handler_may_reregister_itself() {
        let registry = Arc::new(Registry::new());
        let inner = registry.clone();
        registry.on(
            "tick",
            Box::new(move |_| inner.on("tick", Box::new(|_| {}))),
        );

        assert!(registry.dispatch_event("tick", Bytes::new()));
        assert!(registry.has_handler("tick"));
    }

    #[test]
    fn test_cancel_ack() {
        let registry = Registry::new();
        registry.register_ack(7, Box::new(|_| panic!("cancelled ack must not run")));
        assert!(registry.cancel_ack(7));
        assert!(!registry.complete_ack(7, Bytes::new()));
    }
}
