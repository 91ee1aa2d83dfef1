//! Local publish/subscribe surface for forwarded events.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{trace, warn};

/// Listeners of this name receive every event.
pub const WILDCARD_EVENT: &str = "*";

/// Handle returned by [`EventEmitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    id: ListenerId,
    callback: Callback,
    once: bool,
}

/// Maps event names to ordered lists of listeners.
///
/// Emission works on a snapshot, so listeners may subscribe or unsubscribe
/// from inside a callback. A panicking listener is logged and skipped; the
/// rest of the snapshot still runs.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<Subscription>>>,
}

impl EventEmitter {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(callback), false)
    }

    /// Subscribes to the next occurrence of `event` only.
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(callback), true)
    }

    fn subscribe(&self, event: &str, callback: Callback, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push(Subscription { id, callback, once });
        id
    }

    /// Unsubscribes a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let mut emptied = None;
        let mut removed = false;
        for (event, subscriptions) in listeners.iter_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|subscription| subscription.id != id);
            if subscriptions.len() != before {
                removed = true;
                if subscriptions.is_empty() {
                    emptied = Some(event.clone());
                }
                break;
            }
        }
        if let Some(event) = emptied {
            listeners.remove(&event);
        }
        removed
    }

    /// Removes every listener of `event`, or of all events.
    pub fn clear(&self, event: Option<&str>) {
        let mut listeners = self.lock();
        match event {
            Some(event) => {
                listeners.remove(event);
            }
            None => listeners.clear(),
        }
    }

    /// Calls every listener of `event` with `payload`.
    ///
    /// Returns the number of listeners called.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<Callback> = {
            let mut listeners = self.lock();
            let Some(subscriptions) = listeners.get_mut(event) else {
                return 0;
            };
            let snapshot = subscriptions
                .iter()
                .map(|subscription| Arc::clone(&subscription.callback))
                .collect();
            subscriptions.retain(|subscription| !subscription.once);
            if subscriptions.is_empty() {
                listeners.remove(event);
            }
            snapshot
        };

        trace!(event, listeners = snapshot.len(), "emitting event");
        for callback in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                warn!(event, "event listener panicked");
            }
        }
        snapshot.len()
    }

    /// Number of listeners subscribed to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscription>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.lock();
        let mut map = f.debug_map();
        for (event, subscriptions) in listeners.iter() {
            map.entry(event, &subscriptions.len());
        }
        map.finish()
    }
}
