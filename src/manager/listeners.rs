//! Status observers and message handlers.
//!
//! Callbacks run on the manager's control loop, one at a time, in the order
//! events happened. The registry lock is released before any callback runs,
//! so callbacks may register or remove listeners and call back into the
//! manager.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ListenerId;
use crate::protocol::{ConnectionState, InboundMessage};

// ============================================================================
// Types
// ============================================================================

/// Callback for status changes.
pub type StatusObserver = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

/// Callback for inbound messages.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

// ============================================================================
// Listeners
// ============================================================================

/// Registry of every callback attached to a manager.
#[derive(Default)]
pub(crate) struct Listeners {
    /// Status observers in registration order.
    observers: Mutex<Vec<(ListenerId, StatusObserver)>>,
    /// Handlers keyed by message type.
    by_type: Mutex<FxHashMap<String, Vec<(ListenerId, MessageHandler)>>>,
    /// Handlers for every message.
    any: Mutex<Vec<(ListenerId, MessageHandler)>>,
}

impl Listeners {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a status observer.
    pub fn add_observer(&self, observer: StatusObserver) -> ListenerId {
        let id = ListenerId::generate();
        self.observers.lock().push((id, observer));
        id
    }

    /// Adds a handler for one message type.
    pub fn add_handler(&self, message_type: impl Into<String>, handler: MessageHandler) -> ListenerId {
        let id = ListenerId::generate();
        self.by_type
            .lock()
            .entry(message_type.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Adds a handler for all messages.
    pub fn add_catch_all(&self, handler: MessageHandler) -> ListenerId {
        let id = ListenerId::generate();
        self.any.lock().push((id, handler));
        id
    }

    /// Removes a listener of any kind. Returns `true` if it existed.
    pub fn remove(&self, id: ListenerId) -> bool {
        if remove_from(&mut self.observers.lock(), id) || remove_from(&mut self.any.lock(), id) {
            return true;
        }

        let mut by_type = self.by_type.lock();
        let mut removed = false;
        by_type.retain(|_, handlers| {
            removed |= remove_from(handlers, id);
            !handlers.is_empty()
        });
        removed
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
            + self.any.lock().len()
            + self.by_type.lock().values().map(Vec::len).sum::<usize>()
    }

    /// Calls every status observer with `state`.
    pub fn notify_status(&self, state: &ConnectionState) {
        let observers: Vec<StatusObserver> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(state);
        }
    }

    /// Calls the handlers for `message`'s type, then the catch-all handlers.
    ///
    /// Returns how many handlers ran.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let mut handlers: Vec<MessageHandler> = self
            .by_type
            .lock()
            .get(&message.message_type)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        handlers.extend(self.any.lock().iter().map(|(_, h)| Arc::clone(h)));

        if handlers.is_empty() {
            trace!(message_type = %message.message_type, "No handler for message");
        }

        for handler in &handlers {
            handler(message);
        }

        handlers.len()
    }
}

/// Removes `id` from `list`, returning whether it was present.
fn remove_from<T>(list: &mut Vec<(ListenerId, T)>, id: ListenerId) -> bool {
    let before = list.len();
    list.retain(|(listener, _)| *listener != id);
    list.len() != before
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> MessageHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |tag: &str| -> MessageHandler {
            let log = Arc::clone(&log_clone);
            let tag = tag.to_string();
            Arc::new(move |m: &InboundMessage| log.lock().push(format!("{tag}:{}", m.message_type)))
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_routes_by_type_then_catch_all() {
        let listeners = Listeners::new();
        let (log, make) = recorder();

        listeners.add_catch_all(make("any"));
        listeners.add_handler("log", make("log1"));
        listeners.add_handler("log", make("log2"));
        listeners.add_handler("brain_update", make("brain"));

        let ran = listeners.dispatch(&InboundMessage::new("log", Value::Null));

        assert_eq!(ran, 3);
        assert_eq!(*log.lock(), vec!["log1:log", "log2:log", "any:log"]);
    }

    #[test]
    fn test_dispatch_without_handlers() {
        let listeners = Listeners::new();
        assert_eq!(listeners.dispatch(&InboundMessage::new("log", Value::Null)), 0);
    }

    #[test]
    fn test_remove_listener() {
        let listeners = Listeners::new();
        let (log, make) = recorder();

        let id = listeners.add_handler("log", make("log"));
        assert_eq!(listeners.len(), 1);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.len(), 0);

        listeners.dispatch(&InboundMessage::new("log", Value::Null));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_observer_can_register_from_callback() {
        let listeners = Arc::new(Listeners::new());
        let inner = Arc::clone(&listeners);

        listeners.add_observer(Arc::new(move |_: &ConnectionState| {
            inner.add_catch_all(Arc::new(|_: &InboundMessage| {}));
        }));

        listeners.notify_status(&ConnectionState::new());
        assert_eq!(listeners.len(), 2);
    }
}
