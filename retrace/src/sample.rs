//! The sample data unit, time representation, and clocks.
//!
//! Timestamps are `u64` nanoseconds since the Unix epoch. Every stored sample
//! is accounted at a fixed [`SAMPLE_FOOTPRINT_BYTES`], the size of the packed
//! `(timestamp, value)` row, so that the size bound is checkable from sample
//! counts alone.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Accounted byte cost of one stored sample: an 8-byte timestamp plus an
/// 8-byte value.
pub const SAMPLE_FOOTPRINT_BYTES: u64 = 16;

/// Returns the accounted footprint of `count` samples.
#[inline]
pub fn footprint(count: usize) -> u64 {
    (count as u64).saturating_mul(SAMPLE_FOOTPRINT_BYTES)
}

/// Converts a duration to nanoseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Returns a timestamp `secs` seconds after the epoch.
#[inline]
pub const fn secs(secs: u64) -> Timestamp {
    secs * NANOS_PER_SEC
}

/// One immutable sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the reading was taken.
    pub timestamp: Timestamp,
    /// Stable identifier of the sensor.
    pub sensor_id: String,
    /// The measured value.
    pub value: f64,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(timestamp: Timestamp, sensor_id: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.into(),
            value,
        }
    }
}

/// Source of "now" for the sampler.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time in nanoseconds since the epoch.
    fn now_ns(&self) -> Timestamp;
}

/// Wall clock that never goes backwards within one process.
///
/// If the system clock steps back, the last returned value is repeated, so
/// the next sample at that instant is rejected as a duplicate instead of
/// being stored out of order.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_ns)
            .unwrap_or(0);
        let previous = self.last.fetch_max(wall, Ordering::AcqRel);
        previous.max(wall)
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = now.saturating_add(duration_ns(by));
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
