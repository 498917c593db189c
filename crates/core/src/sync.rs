//! Concurrent-map helpers.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// Look up `key` under the shared lock, inserting `make()` under the
/// exclusive lock when absent.
///
/// Returns the entry and whether it was created by this call. The exclusive
/// lock is released before returning, so callers may take per-entry locks
/// afterwards without ordering hazards against the map lock.
pub fn emplace<K, V>(map: &RwLock<HashMap<K, V>>, key: &K, make: impl FnOnce() -> V) -> (V, bool)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    if let Some(v) = map.read().get(key) {
        return (v.clone(), false);
    }
    let mut guard = map.write();
    match guard.entry(key.clone()) {
        Entry::Occupied(e) => (e.get().clone(), false),
        Entry::Vacant(e) => (e.insert(make()).clone(), true),
    }
}
