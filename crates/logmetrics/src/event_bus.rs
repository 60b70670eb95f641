// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal in-process publish/subscribe bus.
//!
//! Call sites publish named payloads; subscribers register a name prefix and a
//! handler. Delivery is synchronous: handlers run on the publishing thread, so
//! a collector in immediate mode has written its line by the time `publish`
//! returns.
//!
//! ```text
//! Publishers (many)         EventBus                 Subscribers
//!     │                        │                         │
//!     ├─ logmetrics.requests ─>│ ── prefix match ──────> handler(name, payload)
//!     └─ other.event ─────────>│    (no match: dropped)  │
//! ```
//!
//! A [`Subscription`] is only an id. Dropping it does not detach the handler;
//! pass it back to [`EventBus::unsubscribe`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::metric::Payload;

pub type Handler = Arc<dyn Fn(&str, &Payload) + Send + Sync>;

/// Handle identifying one registered subscriber.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a subscription stays registered until passed to EventBus::unsubscribe"]
pub struct Subscription(u64);

struct Subscriber {
    id: u64,
    prefix: String,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every event whose name starts with `prefix`.
    pub fn subscribe<F>(&self, prefix: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&str, &Payload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            prefix: prefix.into(),
            handler: Arc::new(handler),
        });
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        Subscription(id)
    }

    /// Detaches a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription.0);
        subscribers.len() != before
    }

    /// Hands `payload` to every matching subscriber, in subscription order.
    ///
    /// The subscriber list is copied before any handler runs, so handlers may
    /// publish, subscribe or unsubscribe without deadlocking.
    pub fn publish(&self, name: &str, payload: &Payload) {
        let matching: Vec<Arc<Subscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| name.starts_with(s.prefix.as_str()))
            .cloned()
            .collect();

        if matching.is_empty() {
            trace!("No subscribers for {name}");
            return;
        }
        for subscriber in matching {
            (subscriber.handler)(name, payload);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metric::MetricKind;
    use std::sync::Mutex;

    fn recording(bus: &EventBus, prefix: &str) -> (Subscription, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = bus.subscribe(prefix, move |name, _| {
            sink.lock().unwrap().push(name.to_string());
        });
        (subscription, seen)
    }

    #[test]
    fn publish_reaches_matching_prefixes_only() {
        let bus = EventBus::new();
        let (_metrics, seen) = recording(&bus, "logmetrics.");

        bus.publish("logmetrics.requests", &Payload::new(MetricKind::Count, 1));
        bus.publish("other.requests", &Payload::new(MetricKind::Count, 1));

        assert_eq!(*seen.lock().unwrap(), vec!["logmetrics.requests"]);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish("logmetrics.requests", &Payload::default());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_detaches_once() {
        let bus = EventBus::new();
        let (subscription, seen) = recording(&bus, "logmetrics.");
        let id = subscription.0;

        assert!(bus.unsubscribe(subscription));
        assert!(!bus.unsubscribe(Subscription(id)));

        bus.publish("logmetrics.requests", &Payload::default());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_a_subscription_keeps_the_handler() {
        let bus = EventBus::new();
        let (subscription, seen) = recording(&bus, "logmetrics.");
        drop(subscription);

        bus.publish("logmetrics.requests", &Payload::default());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let (_inner, seen) = recording(&bus, "inner.");
        let forward = Arc::clone(&bus);
        let _outer = bus.subscribe("outer.", move |_, payload| {
            forward.publish("inner.forwarded", payload);
        });

        bus.publish("outer.event", &Payload::default());
        assert_eq!(*seen.lock().unwrap(), vec!["inner.forwarded"]);
    }
}
