//! Weak-referenced callback registry with per-key subgroups.
//!
//! Subscribers own their handler through the returned [`Subscription`]; the
//! registry keeps only a weak reference. Dropping the subscription removes
//! the handler from dispatch without any central coordination; dead
//! entries are pruned opportunistically during publish and registration.
//!
//! The same type serves both dispatch shapes in the system: the unkeyed
//! form (`K = ()`) is an event stream, and a keyed form (e.g. per
//! [`Symbol`](rg_core::types::Symbol)) fans events out to the subgroup
//! registered under one key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler<E> = dyn Fn(&E) + Send + Sync;

/// Scoped registration; dropping it unregisters the handler.
pub struct Subscription<E> {
    _handler: Arc<Handler<E>>,
}

/// Fan-out registry of weakly-held handlers, grouped by key.
pub struct CallbackRegistry<E, K = ()> {
    slots: Mutex<HashMap<K, Vec<Weak<Handler<E>>>>>,
}

impl<E, K: Eq + Hash> CallbackRegistry<E, K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handler` under `key`.
    ///
    /// The handler stays live for as long as the returned subscription.
    pub fn subscribe_keyed(
        &self,
        key: K,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription<E> {
        let handler: Arc<Handler<E>> = Arc::new(handler);
        let mut slots = self.slots.lock();
        let group = slots.entry(key).or_default();
        group.retain(|weak| weak.strong_count() > 0);
        group.push(Arc::downgrade(&handler));
        Subscription { _handler: handler }
    }

    /// Invoke every live handler registered under `key`.
    ///
    /// Handlers run outside the registry lock, so they are free to
    /// subscribe or take their own locks.
    pub fn publish_keyed(&self, key: &K, event: &E) {
        let handlers: Vec<Arc<Handler<E>>> = {
            let mut slots = self.slots.lock();
            let Some(group) = slots.get_mut(key) else {
                return;
            };
            let live: Vec<_> = group.iter().filter_map(Weak::upgrade).collect();
            if live.len() < group.len() {
                group.retain(|weak| weak.strong_count() > 0);
                if group.is_empty() {
                    slots.remove(key);
                }
            }
            live
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of live handlers currently registered under `key`.
    pub fn live_count(&self, key: &K) -> usize {
        self.slots
            .lock()
            .get(key)
            .map(|group| group.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

impl<E> CallbackRegistry<E, ()> {
    /// Register a handler on the single unkeyed stream.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription<E> {
        self.subscribe_keyed((), handler)
    }

    /// Invoke every live handler on the unkeyed stream.
    pub fn publish(&self, event: &E) {
        self.publish_keyed(&(), event)
    }
}

impl<E, K: Eq + Hash> Default for CallbackRegistry<E, K> {
    fn default() -> Self {
        Self::new()
    }
}
