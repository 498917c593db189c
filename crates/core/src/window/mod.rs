//! Moving-window primitives.
//!
//! All risk rules are built on a bounded, time-ordered deque with a fixed
//! horizon (`frame`). Items expire from the front as newer times are
//! observed; a minimum of `keep` survivors is retained even when expired,
//! which lets price series keep a last-known value.
//!
//! Three public types share the same core:
//! - [`MovingWindow`]: the bare deque.
//! - [`MovingSum`]: deque plus a running sum, for averages and aggregate
//!   yields.
//! - [`MovingMinMax`]: deque plus a counted multiset, for running min/max.
//!
//! Every instance carries one reader-writer lock. Reads at a query time may
//! evict expired items first (upgrading to exclusive access) so aggregates
//! are truthful relative to the query time.

mod deque;
mod minmax;
mod sum;

pub use deque::MovingWindow;
pub use minmax::MovingMinMax;
pub use sum::MovingSum;

pub(crate) use deque::Ring;
