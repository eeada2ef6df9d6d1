//! In-process notification bus
//!
//! Handlers are keyed by [`EventKind`] and invoked synchronously, in
//! subscription order, on the emitting task. Payloads are immutable
//! snapshots so no subscriber can observe another subscriber's changes.
//! There is no buffering, persistence or backpressure.

use crate::client::ConnectionState;
use crate::devices::{CombinedState, RegistrySnapshot};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Event names consumers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Full registry snapshot after a device-level change
    DeviceStatusChanged,
    /// Combined state transition
    StateChanged,
    /// Transport state machine transition
    ConnectionChanged,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::DeviceStatusChanged => "deviceStatusChanged",
            EventKind::StateChanged => "stateChanged",
            EventKind::ConnectionChanged => "connectionChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    DeviceStatusChanged {
        status: Arc<RegistrySnapshot>,
    },
    StateChanged {
        state: CombinedState,
        previous: CombinedState,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::DeviceStatusChanged { .. } => EventKind::DeviceStatusChanged,
            Notification::StateChanged { .. } => EventKind::StateChanged,
            Notification::ConnectionChanged { .. } => EventKind::ConnectionChanged,
        }
    }
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle to one bus instance
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.inner.handlers.lock();
        let counts: HashMap<&str, usize> =
            handlers.iter().map(|(k, v)| (k.name(), v.len())).collect();
        f.debug_struct("NotificationBus")
            .field("subscribers", &counts)
            .finish()
    }
}

/// Handle returned by [`NotificationBus::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. Returns false if it was already gone (for
    /// example after [`NotificationBus::clear`]).
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = inner.handlers.lock();
        let Some(list) = handlers.get_mut(&self.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        before != list.len()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(event = %kind, subscription = id, "Subscriber added");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Forward every `kind` notification into an unbounded channel
    pub fn subscribe_channel(
        &self,
        kind: EventKind,
    ) -> (Subscription, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(kind, move |notification| {
            // Receiver gone: nothing left to deliver to
            let _ = tx.send(notification.clone());
        });
        (subscription, rx)
    }

    /// Invoke every current subscriber of the notification's kind.
    ///
    /// The handler list is copied before dispatch, so handlers may
    /// subscribe or unsubscribe without deadlocking. A panicking handler is
    /// logged and skipped.
    pub fn emit(&self, notification: Notification) {
        let kind = notification.kind();
        let handlers: Vec<Handler> = match self.inner.handlers.lock().get(&kind) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&notification))).is_err() {
                error!(event = %kind, "Notification handler panicked");
            }
        }
    }

    /// Drop subscriptions for one event, or for all events with `None`
    pub fn clear(&self, kind: Option<EventKind>) {
        let mut handlers = self.inner.handlers.lock();
        match kind {
            Some(kind) => {
                handlers.remove(&kind);
            }
            None => handlers.clear(),
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .lock()
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state_changed(state: CombinedState) -> Notification {
        Notification::StateChanged {
            state,
            previous: CombinedState::Idle,
        }
    }

    #[test]
    fn test_emit_runs_in_subscription_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(EventKind::StateChanged, move |_| seen.lock().push(tag));
        }

        bus.emit(state_changed(CombinedState::A));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_emit_only_reaches_matching_kind() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        bus.subscribe(EventKind::DeviceStatusChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(state_changed(CombinedState::B));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let subscription = bus.subscribe(EventKind::StateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(state_changed(CombinedState::A));
        assert!(subscription.unsubscribe());
        bus.emit(state_changed(CombinedState::B));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 0);
    }

    #[test]
    fn test_clear_one_kind_and_all() {
        let bus = NotificationBus::new();
        let a = bus.subscribe(EventKind::StateChanged, |_| {});
        bus.subscribe(EventKind::DeviceStatusChanged, |_| {});
        bus.subscribe(EventKind::ConnectionChanged, |_| {});

        bus.clear(Some(EventKind::StateChanged));
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 0);
        assert_eq!(bus.subscriber_count(EventKind::DeviceStatusChanged), 1);
        assert!(!a.unsubscribe());

        bus.clear(None);
        assert_eq!(bus.subscriber_count(EventKind::DeviceStatusChanged), 0);
        assert_eq!(bus.subscriber_count(EventKind::ConnectionChanged), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));

        bus.subscribe(EventKind::StateChanged, |_| panic!("consumer bug"));
        let counter = hits.clone();
        bus.subscribe(EventKind::StateChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(state_changed(CombinedState::C));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_emit() {
        let bus = NotificationBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_handler = slot.clone();

        let subscription = bus.subscribe(EventKind::StateChanged, move |_| {
            if let Some(sub) = slot_in_handler.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(subscription);

        bus.emit(state_changed(CombinedState::A));
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription_receives_notifications() {
        let bus = NotificationBus::new();
        let (_subscription, mut rx) = bus.subscribe_channel(EventKind::StateChanged);

        bus.emit(state_changed(CombinedState::Ab));
        assert_eq!(rx.recv().await, Some(state_changed(CombinedState::Ab)));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::DeviceStatusChanged.name(), "deviceStatusChanged");
        assert_eq!(EventKind::StateChanged.to_string(), "stateChanged");
    }
}
