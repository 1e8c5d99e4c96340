//! Per-sensor sample history.
//!
//! A [`Series`] is the append-only, time-ordered history of one sensor. It
//! admits a sample only when its timestamp is strictly greater than the last
//! stored one, so timestamps within a series are unique and sorted and every
//! lookup can binary search. Eviction only ever removes samples from the
//! front (oldest end).

use std::collections::VecDeque;

use crate::sample::{Timestamp, footprint};

/// Ordered samples of a single sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: VecDeque<(Timestamp, f64)>,
}

/// Summary statistics over a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    /// Number of samples.
    pub count: usize,
    /// Smallest finite value.
    pub min: f64,
    /// Largest finite value.
    pub max: f64,
    /// Arithmetic mean of finite values.
    pub mean: f64,
}

impl Series {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample if `timestamp` is newer than the last stored one.
    ///
    /// Returns `false`, leaving the series untouched, for a duplicate or
    /// out-of-order timestamp.
    #[inline]
    pub fn push(&mut self, timestamp: Timestamp, value: f64) -> bool {
        if let Some(&(last, _)) = self.points.back()
            && timestamp <= last
        {
            return false;
        }
        self.points.push_back((timestamp, value));
        true
    }

    /// Removes up to `count` of the oldest samples, returning how many were removed.
    pub fn evict_front(&mut self, count: usize) -> usize {
        let count = count.min(self.points.len());
        self.points.drain(..count);
        count
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the oldest sample.
    pub fn oldest(&self) -> Option<Timestamp> {
        self.points.front().map(|&(ts, _)| ts)
    }

    /// Timestamp of the newest sample.
    pub fn newest(&self) -> Option<Timestamp> {
        self.points.back().map(|&(ts, _)| ts)
    }

    /// Accounted byte footprint of this series.
    pub fn footprint(&self) -> u64 {
        footprint(self.points.len())
    }

    /// Number of leading samples with `timestamp <= cutoff`.
    pub fn count_at_or_before(&self, cutoff: Timestamp) -> usize {
        self.points.partition_point(|&(ts, _)| ts <= cutoff)
    }

    /// Returns the timestamp at position `index` (0 = oldest).
    pub fn timestamp_at(&self, index: usize) -> Option<Timestamp> {
        self.points.get(index).map(|&(ts, _)| ts)
    }

    /// Returns the samples with `start <= timestamp <= end`, oldest first.
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Vec<(Timestamp, f64)> {
        if start > end {
            return Vec::new();
        }
        let lo = self.points.partition_point(|&(ts, _)| ts < start);
        let hi = self.points.partition_point(|&(ts, _)| ts <= end);
        self.points.range(lo..hi).copied().collect()
    }

    /// Iterates all samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.points.iter().copied()
    }

    /// Computes min/max/mean over the finite values.
    ///
    /// Returns `None` when the series holds no finite value.
    #[allow(clippy::cast_precision_loss)] // sample counts are far below 2^52
    pub fn stats(&self) -> Option<SeriesStats> {
        let mut count = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for (_, value) in self.points.iter().filter(|(_, v)| v.is_finite()) {
            count += 1;
            min = min.min(*value);
            max = max.max(*value);
            sum += value;
        }

        (count > 0).then(|| SeriesStats {
            count,
            min,
            max,
            mean: sum / count as f64,
        })
    }

    /// Rebuilds a series from arbitrary points, sorting them and dropping
    /// duplicate timestamps (first occurrence wins).
    pub(crate) fn from_points(mut points: Vec<(Timestamp, f64)>) -> Self {
        points.sort_by_key(|&(ts, _)| ts);
        points.dedup_by_key(|&mut (ts, _)| ts);
        Self {
            points: points.into(),
        }
    }
}
