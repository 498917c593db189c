//! Bounded time-ordered deque.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::types::Timestamp;

/// Unsynchronized window core shared by the aggregate wrappers.
///
/// Invariant after any operation: either `len <= keep`, or every item's
/// time satisfies `front_time + frame >= latest observed time`.
pub(crate) struct Ring<V> {
    frame: Duration,
    keep: usize,
    items: VecDeque<(Timestamp, V)>,
}

impl<V> Ring<V> {
    pub(crate) fn new(frame: Duration, keep: usize) -> Self {
        Self {
            frame,
            keep,
            items: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn frame(&self) -> Duration {
        self.frame
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(Timestamp, V)> {
        self.items.iter()
    }

    /// Whether a read at `now` would remove anything.
    pub(crate) fn wants_evict(&self, now: Timestamp) -> bool {
        self.items.len() > self.keep
            && self
                .items
                .front()
                .is_some_and(|(t, _)| *t + self.frame < now)
    }

    /// Insert `(t, v)`, keeping the deque time-ordered.
    ///
    /// - later than (or equal to) the back: append, then expire the front
    ///   against `t`;
    /// - strictly between front and back: insert at the upper bound;
    /// - earlier than the front but still inside the window relative to the
    ///   back: prepend (tolerates slightly late values);
    /// - otherwise the value is too old and is rejected.
    pub(crate) fn insert(
        &mut self,
        t: Timestamp,
        v: V,
        on_evict: &mut dyn FnMut(Timestamp, &V),
    ) -> bool {
        let (front, back) = match (self.items.front(), self.items.back()) {
            (Some(f), Some(b)) => (f.0, b.0),
            _ => {
                self.items.push_back((t, v));
                return true;
            }
        };

        if t >= back {
            if front + self.frame < t {
                self.evict(t, on_evict);
            }
            self.items.push_back((t, v));
            return true;
        }

        if t > front {
            let at = self.items.partition_point(|(it, _)| *it <= t);
            self.items.insert(at, (t, v));
            return true;
        }

        if back < t + self.frame {
            self.items.push_front((t, v));
            return true;
        }

        false
    }

    /// Pop expired items from the front, down to at most `keep` survivors.
    ///
    /// Expiry is strict: an item at exactly `now - frame` survives. Returns
    /// `true` iff anything was removed; each removed item is reported to
    /// `on_evict`.
    pub(crate) fn evict(&mut self, now: Timestamp, on_evict: &mut dyn FnMut(Timestamp, &V)) -> bool {
        let mut removed = false;
        while self.items.len() > self.keep {
            let expired = matches!(self.items.front(), Some((t, _)) if *t + self.frame < now);
            if !expired {
                break;
            }
            if let Some((t, v)) = self.items.pop_front() {
                on_evict(t, &v);
                removed = true;
            }
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

/// Bounded time-ordered deque with a fixed horizon.
///
/// Thread-safe behind one reader-writer lock; see the module docs for the
/// insertion and expiry rules.
pub struct MovingWindow<V> {
    inner: RwLock<Ring<V>>,
}

impl<V> MovingWindow<V> {
    /// Window over `frame`, retaining at least one survivor.
    pub fn new(frame: Duration) -> Self {
        Self::with_keep(frame, 1)
    }

    /// Window over `frame`, retaining at least `keep` survivors.
    pub fn with_keep(frame: Duration, keep: usize) -> Self {
        Self {
            inner: RwLock::new(Ring::new(frame, keep)),
        }
    }

    /// Insert a value; returns `false` when it is too old for the window.
    pub fn insert(&self, t: Timestamp, v: V) -> bool {
        self.inner.write().insert(t, v, &mut |_, _| {})
    }

    /// Insert a value, reporting any items the insertion expires.
    pub fn insert_with(&self, t: Timestamp, v: V, mut f: impl FnMut(Timestamp, &V)) -> bool {
        self.inner.write().insert(t, v, &mut f)
    }

    /// Expire items relative to `now`. Returns `true` iff any were removed.
    pub fn evict(&self, now: Timestamp) -> bool {
        self.evict_with(now, |_, _| {})
    }

    /// Expire items relative to `now`, reporting each removed item.
    pub fn evict_with(&self, now: Timestamp, mut f: impl FnMut(Timestamp, &V)) -> bool {
        let guard = self.inner.upgradable_read();
        if !guard.wants_evict(now) {
            return false;
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.evict(now, &mut f)
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items surviving a read at `now` (evicts first).
    pub fn len_at(&self, now: Timestamp) -> usize {
        self.evict(now);
        self.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Visit every `(time, value)` pair in order under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(Timestamp, &V)) {
        for (t, v) in self.inner.read().iter() {
            f(*t, v);
        }
    }

    /// The window horizon.
    pub fn frame(&self) -> Duration {
        self.inner.read().frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: i64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn window(frame_ms: u64, keep: usize) -> MovingWindow<u32> {
        MovingWindow::with_keep(Duration::from_millis(frame_ms), keep)
    }

    fn times(w: &MovingWindow<u32>) -> Vec<i64> {
        let mut out = Vec::new();
        w.for_each(|t, _| out.push(t.as_millis()));
        out
    }

    #[test]
    fn append_in_order() {
        let w = window(1_000, 1);
        assert!(w.insert(ms(0), 1));
        assert!(w.insert(ms(100), 2));
        assert!(w.insert(ms(100), 3)); // equal time appends at the back
        assert_eq!(times(&w), vec![0, 100, 100]);
    }

    #[test]
    fn insertion_evicts_expired_front() {
        let w = window(1_000, 1);
        w.insert(ms(0), 1);
        w.insert(ms(500), 2);
        w.insert(ms(1_600), 3);
        assert_eq!(times(&w), vec![500, 1_600]);
    }

    #[test]
    fn item_at_exact_horizon_survives() {
        let w = window(1_000, 0);
        w.insert(ms(0), 1);
        w.insert(ms(1_000), 2); // front + frame == t: not expired
        assert_eq!(times(&w), vec![0, 1_000]);
        assert!(!w.evict(ms(1_000)));
        assert!(w.evict(ms(1_001)));
        assert_eq!(times(&w), vec![1_000]);
    }

    #[test]
    fn interior_insert_at_upper_bound() {
        let w = window(10_000, 1);
        w.insert(ms(0), 1);
        w.insert(ms(200), 2);
        w.insert(ms(100), 3);
        w.insert(ms(100), 4); // after the existing t=100 entry
        let mut vals = Vec::new();
        w.for_each(|_, v| vals.push(*v));
        assert_eq!(times(&w), vec![0, 100, 100, 200]);
        assert_eq!(vals, vec![1, 3, 4, 2]);
    }

    #[test]
    fn late_value_prepends_within_window() {
        let w = window(1_000, 1);
        w.insert(ms(500), 1);
        assert!(w.insert(ms(100), 2)); // back < t + frame
        assert_eq!(times(&w), vec![100, 500]);
    }

    #[test]
    fn too_old_value_is_rejected() {
        let w = window(1_000, 1);
        w.insert(ms(5_000), 1);
        assert!(!w.insert(ms(100), 2)); // back >= t + frame
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn keep_floor_holds_expired_items() {
        let w = window(1_000, 2);
        w.insert(ms(0), 1);
        w.insert(ms(10), 2);
        w.insert(ms(20), 3);
        assert!(w.evict(ms(50_000)));
        assert_eq!(w.len(), 2); // all expired, keep = 2 survive
    }

    #[test]
    fn keep_zero_can_drain_completely() {
        let w = window(1_000, 0);
        w.insert(ms(0), 1);
        w.insert(ms(10), 2);
        assert!(w.evict(ms(5_000)));
        assert!(w.is_empty());
    }

    #[test]
    fn evict_reports_removed_items() {
        let w = window(1_000, 0);
        w.insert(ms(0), 1);
        w.insert(ms(10), 2);
        w.insert(ms(2_000), 3);
        let mut removed = Vec::new();
        w.evict_with(ms(2_000), |t, v| removed.push((t.as_millis(), *v)));
        assert_eq!(removed, vec![(0, 1), (10, 2)]);
    }

    #[test]
    fn window_invariant_after_random_operations() {
        let frame = Duration::from_millis(1_000);
        let w = MovingWindow::with_keep(frame, 1);
        let mut latest = ms(0);
        for i in 0..500i64 {
            let t = ms((i * 37) % 7_000 + i);
            if t > latest {
                latest = t;
            }
            w.insert(t, i as u32);
        }
        w.evict(latest);
        // Either at the keep floor or every survivor is inside the frame.
        if w.len() > 1 {
            let mut front = None;
            w.for_each(|t, _| {
                if front.is_none() {
                    front = Some(t);
                }
            });
            assert!(front.unwrap() + frame >= latest);
        }
    }

    #[test]
    fn len_at_evicts_first() {
        let w = window(1_000, 0);
        w.insert(ms(0), 1);
        w.insert(ms(100), 2);
        assert_eq!(w.len_at(ms(1_200)), 0);
    }

    #[test]
    fn clear_empties() {
        let w = window(1_000, 1);
        w.insert(ms(0), 1);
        w.clear();
        assert!(w.is_empty());
    }
}
