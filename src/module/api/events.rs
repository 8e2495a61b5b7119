//! Event notification system for the registry
//!
//! Synchronous pub/sub: events are delivered to every subscriber of their kind
//! at the moment they are published, in subscription order. There is no queue
//! and no replay.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

use crate::module::id::ModuleId;
use crate::utils::lock::{read_lock, write_lock};

/// Event kinds a subscriber can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A module was published into the registry
    Register,
    /// The loader finished loading a code unit
    Load,
    /// The loader gave up on a code unit
    Error,
    /// A module was registered with missing or malformed dependencies
    DependencyError,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum RegistryEvent {
    Register {
        id: ModuleId,
        dependencies: Vec<ModuleId>,
    },
    Load {
        locator: String,
        module_id: Option<ModuleId>,
    },
    Error {
        locator: String,
        kind: String,
        message: String,
    },
    DependencyError {
        id: ModuleId,
        missing: Vec<String>,
        invalid: Vec<String>,
    },
}

impl RegistryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RegistryEvent::Register { .. } => EventKind::Register,
            RegistryEvent::Load { .. } => EventKind::Load,
            RegistryEvent::Error { .. } => EventKind::Error,
            RegistryEvent::DependencyError { .. } => EventKind::DependencyError,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Callback = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Event subscription manager
#[derive(Default)]
pub struct EventManager {
    subscribers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Callback)>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback` to events of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        write_lock(&self.subscribers)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!("Subscribed {:?} to {:?} events", id, kind);
        id
    }

    /// Remove a subscription; returns false if it was not present
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscribers = write_lock(&self.subscribers);
        match subscribers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(sub, _)| *sub != id);
                before != list.len()
            }
            None => false,
        }
    }

    /// Deliver `event` to every subscriber of its kind
    ///
    /// Callbacks run after the subscriber lock is released, so a callback may
    /// itself subscribe or publish. A panicking callback is logged and does not
    /// stop delivery to the others. Returns the number of clean deliveries.
    pub fn publish(&self, event: &RegistryEvent) -> usize {
        let kind = event.kind();
        let callbacks: Vec<(SubscriptionId, Callback)> = read_lock(&self.subscribers)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("Subscriber {:?} panicked while handling {:?} event", id, kind),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn register_event(name: &str) -> RegistryEvent {
        RegistryEvent::Register {
            id: ModuleId::new("test", name).unwrap(),
            dependencies: vec![],
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let events = EventManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            events.subscribe(EventKind::Register, move |_| seen.lock().unwrap().push(tag));
        }

        assert_eq!(events.publish(&register_event("a")), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_only_matching_kind_receives() {
        let events = EventManager::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        events.subscribe(EventKind::Load, move |_| *counter.lock().unwrap() += 1);

        assert_eq!(events.publish(&register_event("a")), 0);
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let events = EventManager::new();
        let hits = Arc::new(Mutex::new(0));
        events.subscribe(EventKind::Register, |_| panic!("boom"));
        let counter = Arc::clone(&hits);
        events.subscribe(EventKind::Register, move |_| *counter.lock().unwrap() += 1);

        assert_eq!(events.publish(&register_event("a")), 1);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let events = EventManager::new();
        let failure = RegistryEvent::Error {
            locator: "core/x".to_string(),
            kind: "FetchError".to_string(),
            message: "gone".to_string(),
        };
        let id = events.subscribe(EventKind::Error, |_| {});
        assert_eq!(events.publish(&failure), 1);
        assert!(events.unsubscribe(EventKind::Error, id));
        assert!(!events.unsubscribe(EventKind::Error, id));
        assert!(!events.unsubscribe(EventKind::Load, id));
        assert_eq!(events.publish(&failure), 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(register_event("a")).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["payload"]["id"], "test.a");
    }
}
