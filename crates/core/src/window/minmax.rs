//! Moving window with running min/max via a counted multiset.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::types::Timestamp;

use super::Ring;

struct MinMaxRing<V: Ord> {
    ring: Ring<V>,
    counts: BTreeMap<V, usize>,
}

fn remove_one<V: Ord>(counts: &mut BTreeMap<V, usize>, v: &V) {
    if let Some(n) = counts.get_mut(v) {
        *n -= 1;
        if *n == 0 {
            counts.remove(v);
        }
    }
}

/// Moving window maintaining a `value → count` multiset of the present
/// items, so min and max are O(log n) at any query time.
pub struct MovingMinMax<V: Ord> {
    inner: RwLock<MinMaxRing<V>>,
}

impl<V: Ord + Clone> MovingMinMax<V> {
    /// Window over `frame`, retaining at least one survivor.
    pub fn new(frame: Duration) -> Self {
        Self::with_keep(frame, 1)
    }

    /// Window over `frame`, retaining at least `keep` survivors.
    pub fn with_keep(frame: Duration, keep: usize) -> Self {
        Self {
            inner: RwLock::new(MinMaxRing {
                ring: Ring::new(frame, keep),
                counts: BTreeMap::new(),
            }),
        }
    }

    /// Insert a value; returns `false` when it is too old for the window.
    pub fn insert(&self, t: Timestamp, v: V) -> bool {
        let mut guard = self.inner.write();
        let MinMaxRing { ring, counts } = &mut *guard;
        if ring.insert(t, v.clone(), &mut |_, old| remove_one(counts, old)) {
            *counts.entry(v).or_insert(0) += 1;
            true
        } else {
            false
        }
    }

    /// Smallest surviving value at `now`, or `None` when empty.
    pub fn min_at(&self, now: Timestamp) -> Option<V> {
        self.evicted(now, |counts| counts.keys().next().cloned())
    }

    /// Largest surviving value at `now`, or `None` when empty.
    pub fn max_at(&self, now: Timestamp) -> Option<V> {
        self.evicted(now, |counts| counts.keys().next_back().cloned())
    }

    /// Smallest present value, without expiring anything.
    pub fn min(&self) -> Option<V> {
        self.inner.read().counts.keys().next().cloned()
    }

    /// Largest present value, without expiring anything.
    pub fn max(&self) -> Option<V> {
        self.inner.read().counts.keys().next_back().cloned()
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.inner.read().ring.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The window horizon.
    pub fn frame(&self) -> Duration {
        self.inner.read().ring.frame()
    }

    fn evicted<R>(&self, now: Timestamp, f: impl FnOnce(&BTreeMap<V, usize>) -> R) -> R {
        let guard = self.inner.upgradable_read();
        if !guard.ring.wants_evict(now) {
            return f(&guard.counts);
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let MinMaxRing { ring, counts } = &mut *guard;
        ring.evict(now, &mut |_, old| remove_one(counts, old));
        f(counts)
    }
}
