//! Time injection for deterministic scheduling
//!
//! Every component that needs the current time or the current day takes a
//! [`Clock`] instead of reading the wall clock, so tests drive time
//! explicitly and day boundaries never depend on string-formatted dates.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// Source of the current instant and of day-bucket arithmetic
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Whole days since the Unix epoch for `instant`
    ///
    /// `div_euclid` keeps pre-epoch instants in the bucket they belong to
    /// instead of rounding toward zero.
    fn day_bucket(&self, instant: DateTime<Utc>) -> i64 {
        instant.timestamp().div_euclid(SECONDS_PER_DAY)
    }

    /// Bucket of the current instant
    fn today(&self) -> i64 {
        self.day_bucket(self.now())
    }
}

/// Wall-clock UTC time with a configurable day rollover offset
///
/// The offset shifts the day boundary away from UTC midnight (e.g. an
/// offset of 240 rolls the day over at 04:00 UTC), the usual "next day
/// starts at 4 am" behavior.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    rollover_offset_minutes: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            rollover_offset_minutes: 0,
        }
    }

    pub fn with_rollover_offset(minutes: i64) -> Self {
        Self {
            rollover_offset_minutes: minutes,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn day_bucket(&self, instant: DateTime<Utc>) -> i64 {
        (instant.timestamp() - self.rollover_offset_minutes * 60).div_euclid(SECONDS_PER_DAY)
    }
}

/// Settable clock for tests
///
/// Clones share the same instant, so a test can keep one handle and hand
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().unwrap() = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut instant = self.instant.lock().unwrap();
        *instant += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap()
    }
}
