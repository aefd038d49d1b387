//! Typed publish/subscribe broadcaster for manager lifecycle events
//!
//! Delivery is synchronous and in registration order. A failing listener
//! is isolated: it cannot stop delivery to later listeners, and it
//! cannot fail the operation that emitted the event.

use crate::notifications::event::{EventKind, ManagerEvent};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callback invoked for every event of the kind it subscribed to
pub type Listener = Arc<dyn Fn(&ManagerEvent) + Send + Sync>;

/// Token returned by [`EventBroadcaster::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    listener: Listener,
}

/// Publish/subscribe hub for [`ManagerEvent`]s
pub struct EventBroadcaster {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<Registration>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener for one event kind.
    ///
    /// Emits a `NewListener` meta-event once per call, immediately after
    /// the listener is registered.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut listeners = self.listeners.lock().unwrap();
            listeners
                .entry(kind)
                .or_default()
                .push(Registration { id, listener });
        }
        log::trace!("listener {:?} subscribed to {}", id, kind);
        self.notify(&ManagerEvent::NewListener(kind));
        id
    }

    /// Deregister a listener.
    ///
    /// Emits a `RemoveListener` meta-event when a listener was actually
    /// removed; returns whether one was.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let removed = {
            let mut listeners = self.listeners.lock().unwrap();
            match listeners.get_mut(&kind) {
                Some(registrations) => {
                    let before = registrations.len();
                    registrations.retain(|registration| registration.id != id);
                    registrations.len() != before
                }
                None => false,
            }
        };
        if removed {
            log::trace!("listener {:?} unsubscribed from {}", id, kind);
            self.notify(&ManagerEvent::RemoveListener(kind));
        }
        removed
    }

    /// Deliver an event to every listener of its kind, in registration
    /// order.
    pub fn notify(&self, event: &ManagerEvent) {
        // Snapshot under the lock, deliver outside it: listeners may
        // subscribe or unsubscribe reentrantly during delivery.
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .get(&event.kind())
                .map(|registrations| {
                    registrations
                        .iter()
                        .map(|registration| registration.listener.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::warn!("listener for {} panicked during delivery", event.kind());
            }
        }
    }

    /// Number of listeners currently registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .get(&kind)
            .map(|registrations| registrations.len())
            .unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recording_listener(log: &Arc<StdMutex<Vec<String>>>, tag: &str) -> Listener {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |event: &ManagerEvent| {
            log.lock().unwrap().push(format!("{}:{}", tag, event.kind()));
        })
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        broadcaster.subscribe(EventKind::ManagerClosed, recording_listener(&log, "first"));
        broadcaster.subscribe(EventKind::ManagerClosed, recording_listener(&log, "second"));

        broadcaster.notify(&ManagerEvent::ManagerClosed);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:queueManagerClosed".to_string(),
                "second:queueManagerClosed".to_string()
            ]
        );
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        broadcaster.subscribe(
            EventKind::ManagerClosed,
            Arc::new(|_event: &ManagerEvent| panic!("listener blew up")),
        );
        broadcaster.subscribe(EventKind::ManagerClosed, recording_listener(&log, "after"));

        // The panic must not escape notify nor starve the second listener
        broadcaster.notify(&ManagerEvent::ManagerClosed);

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let id = broadcaster.subscribe(EventKind::ManagerClosed, recording_listener(&log, "x"));
        assert_eq!(broadcaster.listener_count(EventKind::ManagerClosed), 1);

        assert!(broadcaster.unsubscribe(EventKind::ManagerClosed, id));
        broadcaster.notify(&ManagerEvent::ManagerClosed);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(broadcaster.listener_count(EventKind::ManagerClosed), 0);

        // Unknown ids are not an error and emit no meta-event
        assert!(!broadcaster.unsubscribe(EventKind::ManagerClosed, id));
    }

    #[test]
    fn test_meta_events_fire_per_subscribe_and_unsubscribe() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        broadcaster.subscribe(EventKind::NewListener, recording_listener(&log, "meta"));
        broadcaster.subscribe(EventKind::RemoveListener, recording_listener(&log, "meta"));

        // Each of the two subscriptions above triggered NewListener
        // deliveries to whoever was registered for it at the time: the
        // first subscribe notified itself, the second notified the first.
        let after_setup = log.lock().unwrap().len();
        assert_eq!(after_setup, 2);

        let id = broadcaster.subscribe(EventKind::ManagerClosed, recording_listener(&log, "main"));
        assert_eq!(log.lock().unwrap().len(), after_setup + 1);
        assert_eq!(log.lock().unwrap().last().unwrap(), "meta:newListener");

        broadcaster.unsubscribe(EventKind::ManagerClosed, id);
        assert_eq!(log.lock().unwrap().last().unwrap(), "meta:removeListener");
    }

    #[test]
    fn test_reentrant_subscribe_from_listener() {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let log = Arc::new(StdMutex::new(Vec::new()));

        let reentrant = {
            let broadcaster = Arc::clone(&broadcaster);
            let log = Arc::clone(&log);
            Arc::new(move |_event: &ManagerEvent| {
                let log = Arc::clone(&log);
                broadcaster.subscribe(
                    EventKind::ManagerClosed,
                    Arc::new(move |event: &ManagerEvent| {
                        log.lock().unwrap().push(event.kind().to_string());
                    }),
                );
            })
        };
        broadcaster.subscribe(EventKind::ManagerClosed, reentrant);

        // First delivery registers a second listener without deadlocking;
        // the snapshot means it only hears the second event.
        broadcaster.notify(&ManagerEvent::ManagerClosed);
        assert!(log.lock().unwrap().is_empty());

        broadcaster.notify(&ManagerEvent::ManagerClosed);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
