//! Retention policy: which stored samples must be evicted.
//!
//! [`plan_eviction`] is a pure function of the current series contents, the
//! retention clock `now`, and a [`RetentionConfig`]. It never mutates; the
//! store applies the returned [`EvictionPlan`].
//!
//! # Algorithm
//!
//! 1. **Age**: in every series, drop the leading samples whose age has
//!    reached `max_age` (`timestamp <= now - max_age`). Series are time
//!    ordered, so this is one binary search per series.
//! 2. **Size**: if the survivors still exceed `max_bytes`, repeatedly drop
//!    the globally oldest remaining sample across *all* series (a k-way merge
//!    over the series heads) until the total fits. Eviction order is strictly
//!    chronological regardless of which sensor a sample belongs to, so a
//!    high-frequency sensor is neither favored nor starved. Equal timestamps
//!    are broken by series position, which the store keeps in sensor-id order.
//!    A series whose last sample is evicted this way simply disappears.
//! 3. **Degenerate budget**: when `max_bytes` is below one
//!    [`SAMPLE_FOOTPRINT_BYTES`](crate::sample::SAMPLE_FOOTPRINT_BYTES), no
//!    sample fits at all. Each series then keeps only its newest sample;
//!    this is a valid state, not an error.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::config::RetentionConfig;
use crate::sample::Timestamp;
use crate::series::Series;

/// Samples to evict, per series, in the order the series were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    drops: Vec<usize>,
    by_age: usize,
    by_size: usize,
}

impl EvictionPlan {
    /// Number of leading samples to drop from each series.
    pub fn drops(&self) -> &[usize] {
        &self.drops
    }

    /// Samples evicted because they aged out.
    pub fn by_age(&self) -> usize {
        self.by_age
    }

    /// Samples evicted to get back under the byte budget.
    pub fn by_size(&self) -> usize {
        self.by_size
    }

    /// Total samples evicted.
    pub fn total(&self) -> usize {
        self.by_age + self.by_size
    }

    /// Whether nothing needs evicting.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Computes which samples to evict so that every series satisfies the age
/// bound at `now` and the store as a whole fits in `max_bytes`.
pub fn plan_eviction(series: &[&Series], now: Timestamp, config: &RetentionConfig) -> EvictionPlan {
    let mut drops = vec![0usize; series.len()];

    // Age pass
    let mut by_age = 0;
    if let Some(cutoff) = now.checked_sub(config.max_age_ns()) {
        for (drop, s) in drops.iter_mut().zip(series) {
            *drop = s.count_at_or_before(cutoff);
            by_age += *drop;
        }
    }

    // Size pass
    let capacity = usize::try_from(config.sample_capacity()).unwrap_or(usize::MAX);
    let mut by_size = 0;

    if capacity == 0 {
        for (drop, s) in drops.iter_mut().zip(series) {
            let keep = usize::from(s.len() > *drop);
            by_size += s.len() - *drop - keep;
            *drop = s.len() - keep;
        }
    } else {
        let mut remaining: usize = series
            .iter()
            .zip(&drops)
            .map(|(s, &drop)| s.len() - drop)
            .sum();

        if remaining > capacity {
            // Min-heap over the current head of every non-empty series.
            let mut heads: BinaryHeap<Reverse<(Timestamp, usize)>> = series
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.timestamp_at(drops[i]).map(|ts| Reverse((ts, i))))
                .collect();

            while remaining > capacity {
                let Some(Reverse((_, i))) = heads.pop() else {
                    break;
                };
                drops[i] += 1;
                remaining -= 1;
                by_size += 1;

                if let Some(ts) = series[i].timestamp_at(drops[i]) {
                    heads.push(Reverse((ts, i)));
                }
            }
        }
    }

    EvictionPlan {
        drops,
        by_age,
        by_size,
    }
}
