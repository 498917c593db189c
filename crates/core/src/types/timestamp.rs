//! Millisecond wall-clock timestamps.
//!
//! [`Timestamp`] wraps milliseconds since the Unix epoch. The wire and
//! journal encode timestamps as `YYYY-MM-DD HH:MM:SS.mmm` in UTC; parsing
//! and formatting round-trip at millisecond precision.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire timestamp format, millisecond precision.
const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Millisecond-precision wall-clock timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch, also the value of an unset timestamp.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Build from milliseconds since the Unix epoch.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, zero if `self` is not later.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        if self.0 > earlier.0 {
            Duration::from_millis((self.0 - earlier.0) as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_millis() as i64)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format(WIRE_FORMAT)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Failed to parse a wire timestamp.
#[derive(Debug, Clone, Error)]
#[error("invalid timestamp: {0:?}")]
pub struct ParseTimestampError(String);

impl FromStr for Timestamp {
    type Err = ParseTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s, WIRE_FORMAT)
            .map_err(|_| ParseTimestampError(s.to_string()))?;
        Ok(Self(naive.and_utc().timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_wire_format() {
        let ts: Timestamp = "2024-03-01 10:00:00.500".parse().unwrap();
        assert_eq!(ts.as_millis() % 1000, 500);
    }

    #[test]
    fn display_roundtrip() {
        let text = "2024-03-01 10:00:00.500";
        let ts: Timestamp = text.parse().unwrap();
        assert_eq!(format!("{}", ts), text);
    }

    #[test]
    fn rejects_garbage() {
        assert!("yesterday".parse::<Timestamp>().is_err());
        assert!("2024-03-01".parse::<Timestamp>().is_err());
    }

    #[test]
    fn add_duration() {
        let ts = Timestamp::from_millis(1_000);
        assert_eq!((ts + Duration::from_millis(500)).as_millis(), 1_500);
    }

    #[test]
    fn duration_since_saturates() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(3_500);
        assert_eq!(b - a, Duration::from_millis(2_500));
        assert_eq!(a - b, Duration::ZERO);
    }

    #[test]
    fn ordering() {
        assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
        assert_eq!(Timestamp::EPOCH, Timestamp::from_millis(0));
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}
