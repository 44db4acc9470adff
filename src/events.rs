//! Unsolicited event fan-out.
//!
//! Handlers subscribe per event code and run synchronously on the receive
//! loop, in subscription order. Handlers must not block; anything slow
//! belongs on a channel the handler feeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::body::Body;

/// A decoded unsolicited event, or the engine's own connection event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event code; wire events are 1000-based, engine events negative.
    pub code: i32,
    /// Decoded payload.
    pub body: Body,
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-code handler registry.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<HashMap<i32, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, Vec<(SubscriptionId, Handler)>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `handler` for `code`. Handlers for the same code run in
    /// subscription order.
    pub fn subscribe<F>(&self, code: i32, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(code)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes one subscription. Returns false when it was already gone.
    pub fn unsubscribe(&self, code: i32, id: SubscriptionId) -> bool {
        let mut map = self.lock();
        let Some(handlers) = map.get_mut(&code) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            map.remove(&code);
        }
        removed
    }

    /// Invokes every handler subscribed to `event.code`.
    ///
    /// Handlers are cloned out of the lock before running, so a handler
    /// may subscribe or unsubscribe without deadlocking; such changes
    /// take effect from the next publish.
    pub fn publish(&self, event: &Event) {
        let handlers: Vec<Handler> = {
            let map = self.lock();
            match map.get(&event.code) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of live subscriptions for `code`.
    pub fn subscriber_count(&self, code: i32) -> usize {
        self.lock().get(&code).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(code: i32) -> Event {
        Event {
            code,
            body: Body::Empty,
        }
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_in = hits.clone();
        bus.subscribe(1001, move |_| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&event(1001));
        bus.publish(&event(1002));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(1001, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        bus.publish(&event(1001));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_in = hits.clone();
        let id = bus.subscribe(1001, move |_| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&event(1001));
        assert!(bus.unsubscribe(1001, id));
        bus.publish(&event(1001));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(1001), 0);
        assert!(!bus.unsubscribe(1001, id));
    }

    #[test]
    fn test_handler_sees_event_body() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_in = seen.clone();
        bus.subscribe(1009, move |e| {
            *seen_in.lock().unwrap() = Some(e.body.clone());
        });

        bus.publish(&Event {
            code: 1009,
            body: Body::Ints(vec![31, 99]),
        });
        assert_eq!(*seen.lock().unwrap(), Some(Body::Ints(vec![31, 99])));
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_in = bus.clone();
        let slot_in = id_slot.clone();
        let id = bus.subscribe(1001, move |_| {
            if let Some(id) = slot_in.lock().unwrap().take() {
                bus_in.unsubscribe(1001, id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        bus.publish(&event(1001));
        assert_eq!(bus.subscriber_count(1001), 0);
    }
}
