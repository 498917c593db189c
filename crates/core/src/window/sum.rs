//! Moving window with a running sum.

use std::ops::{AddAssign, SubAssign};
use std::time::Duration;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::types::Timestamp;

use super::Ring;

struct SumRing<V, S> {
    ring: Ring<V>,
    sum: S,
}

/// Moving window maintaining `sum` over the present items.
///
/// `S` defaults to the value type; a distinct accumulator type can be used
/// when the aggregate is richer than the values themselves (e.g. a signed
/// position total accumulated from individual trades). Insertion adds the
/// value to the sum; eviction subtracts it, so `sum == Σ vᵢ` holds at every
/// observable point.
pub struct MovingSum<V, S = V> {
    inner: RwLock<SumRing<V, S>>,
}

impl<V, S> MovingSum<V, S>
where
    V: Clone,
    S: Default + for<'a> AddAssign<&'a V> + for<'a> SubAssign<&'a V>,
{
    /// Window over `frame`, retaining at least one survivor.
    pub fn new(frame: Duration) -> Self {
        Self::with_keep(frame, 1)
    }

    /// Window over `frame`, retaining at least `keep` survivors.
    pub fn with_keep(frame: Duration, keep: usize) -> Self {
        Self {
            inner: RwLock::new(SumRing {
                ring: Ring::new(frame, keep),
                sum: S::default(),
            }),
        }
    }

    /// Insert a value; returns `false` when it is too old for the window.
    pub fn insert(&self, t: Timestamp, v: V) -> bool {
        let mut guard = self.inner.write();
        let SumRing { ring, sum } = &mut *guard;
        if ring.insert(t, v.clone(), &mut |_, old| *sum -= old) {
            *sum += &v;
            true
        } else {
            false
        }
    }

    /// The running sum after expiring items relative to `now`.
    pub fn sum_at(&self, now: Timestamp) -> S
    where
        S: Clone,
    {
        let guard = self.inner.upgradable_read();
        if !guard.ring.wants_evict(now) {
            return guard.sum.clone();
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let SumRing { ring, sum } = &mut *guard;
        ring.evict(now, &mut |_, old| *sum -= old);
        sum.clone()
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.inner.read().ring.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything and reset the sum.
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.ring.clear();
        guard.sum = S::default();
    }

    /// The window horizon.
    pub fn frame(&self) -> Duration {
        self.inner.read().ring.frame()
    }
}

impl MovingSum<f64> {
    /// Mean of the items surviving a read at `now`; `0.0` when empty.
    pub fn average_at(&self, now: Timestamp) -> f64 {
        let guard = self.inner.upgradable_read();
        let (sum, len) = if guard.ring.wants_evict(now) {
            let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
            let SumRing { ring, sum } = &mut *guard;
            ring.evict(now, &mut |_, old| *sum -= old);
            (*sum, ring.len())
        } else {
            (guard.sum, guard.ring.len())
        };
        if len == 0 {
            0.0
        } else {
            sum / len as f64
        }
    }

    /// Mean of the items currently present, without expiring anything.
    pub fn average(&self) -> f64 {
        let guard = self.inner.read();
        if guard.ring.len() == 0 {
            0.0
        } else {
            guard.sum / guard.ring.len() as f64
        }
    }
}
