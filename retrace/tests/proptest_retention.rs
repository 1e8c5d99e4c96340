//! Property-based tests for retention.
//!
//! Verifies, for arbitrary append sequences and configurations:
//! - the age bound holds after every append
//! - the size bound holds for every budget of at least one sample
//! - a budget below one sample keeps just the newest sample per sensor
//! - timestamps within a series stay unique and strictly increasing
//! - size eviction is globally chronological (fairness across sensors)
//! - queries are idempotent and never mutate

use std::collections::BTreeMap;
use std::time::Duration;

use proptest::prelude::*;

use retrace::retention::plan_eviction;
use retrace::sample::{NANOS_PER_SEC, SAMPLE_FOOTPRINT_BYTES};
use retrace::series::Series;
use retrace::{AppendOutcome, RetentionConfig, Sample, Store};

// =============================================================================
// Proptest strategies
// =============================================================================

const SENSORS: &[&str] = &["cpu", "cpu_temp", "gpu", "fan"];

/// Generate a valid RetentionConfig with small bounds so eviction triggers.
fn arb_config() -> impl Strategy<Value = RetentionConfig> {
    (1u64..=30, 1u64..=64).prop_map(|(max_age_secs, max_samples)| RetentionConfig {
        interval: Duration::from_secs(1),
        max_age: Duration::from_secs(max_age_secs),
        max_bytes: max_samples * SAMPLE_FOOTPRINT_BYTES,
    })
}

/// Generate a sequence of (time step in ms, sensor index, value) appends.
///
/// Steps of zero produce duplicate timestamps on purpose.
fn arb_appends() -> impl Strategy<Value = Vec<(u64, usize, f64)>> {
    prop::collection::vec((0u64..=2_000, 0..SENSORS.len(), -100.0f64..100.0), 1..200)
}

/// Generate per-sensor sampling periods in seconds.
fn arb_periods() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..=4, 2..=4)
}

fn ms(n: u64) -> u64 {
    n * 1_000_000
}

// =============================================================================
// Store invariants
// =============================================================================

proptest! {
    #[test]
    fn age_bound_holds_after_every_append(config in arb_config(), appends in arb_appends()) {
        let mut store = Store::new(config);
        let mut now = NANOS_PER_SEC;

        for (step, sensor, value) in appends {
            now += ms(step);
            store.append(Sample::new(now, SENSORS[sensor], value));

            let clock = store.retention_clock();
            for id in SENSORS {
                if let Some(oldest) = store.series(id).and_then(Series::oldest) {
                    prop_assert!(clock - oldest < config.max_age_ns());
                }
            }
        }
    }

    #[test]
    fn size_bound_holds_after_every_append(config in arb_config(), appends in arb_appends()) {
        let mut store = Store::new(config);
        let mut now = NANOS_PER_SEC;

        for (step, sensor, value) in appends {
            now += ms(step);
            store.append(Sample::new(now, SENSORS[sensor], value));
            prop_assert!(store.footprint() <= config.max_bytes);
        }
    }

    #[test]
    fn timestamps_stay_unique_and_sorted(config in arb_config(), appends in arb_appends()) {
        let mut store = Store::new(config);
        let mut now = NANOS_PER_SEC;

        for (step, sensor, value) in appends {
            now += ms(step);
            store.append(Sample::new(now, SENSORS[sensor], value));
        }

        for id in SENSORS {
            if let Some(series) = store.series(id) {
                let timestamps: Vec<u64> = series.iter().map(|(ts, _)| ts).collect();
                prop_assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn queries_are_idempotent(
        config in arb_config(),
        appends in arb_appends(),
        start in 0u64..400,
        len in 0u64..400,
    ) {
        let mut store = Store::new(config);
        let mut now = NANOS_PER_SEC;
        for (step, sensor, value) in appends {
            now += ms(step);
            store.append(Sample::new(now, SENSORS[sensor], value));
        }

        let t0 = NANOS_PER_SEC + start * NANOS_PER_SEC;
        let t1 = t0 + len * NANOS_PER_SEC;
        let footprint = store.footprint();

        let first = store.query(SENSORS, t0, t1).unwrap();
        let second = store.query(SENSORS, t0, t1).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(store.footprint(), footprint);

        for series in &first {
            prop_assert!(series.points().iter().all(|&(ts, _)| t0 <= ts && ts <= t1));
        }
    }
}

// =============================================================================
// Fairness
// =============================================================================

proptest! {
    #[test]
    fn size_eviction_is_globally_chronological(
        periods in arb_periods(),
        horizon in 10u64..60,
        budget in 1u64..40,
    ) {
        // sensor i samples every periods[i] seconds
        let series: Vec<Series> = periods
            .iter()
            .map(|&period| {
                let mut s = Series::new();
                for t in (period..=horizon).step_by(usize::try_from(period).unwrap()) {
                    s.push(t * NANOS_PER_SEC, 0.0);
                }
                s
            })
            .collect();
        let views: Vec<&Series> = series.iter().collect();

        let config = RetentionConfig {
            interval: Duration::from_secs(1),
            max_age: Duration::from_secs(3600),
            max_bytes: budget * SAMPLE_FOOTPRINT_BYTES,
        };
        let plan = plan_eviction(&views, horizon * NANOS_PER_SEC, &config);

        // Every evicted sample is no newer than every retained sample.
        let mut evicted: BTreeMap<u64, usize> = BTreeMap::new();
        let mut retained_min = u64::MAX;
        for (s, &drop) in series.iter().zip(plan.drops()) {
            for (i, (ts, _)) in s.iter().enumerate() {
                if i < drop {
                    *evicted.entry(ts).or_default() += 1;
                } else {
                    retained_min = retained_min.min(ts);
                }
            }
        }
        if let Some((&newest_evicted, _)) = evicted.iter().next_back() {
            prop_assert!(newest_evicted <= retained_min);
        }

        let remaining: usize = series.iter().zip(plan.drops()).map(|(s, &d)| s.len() - d).sum();
        prop_assert!(remaining as u64 * SAMPLE_FOOTPRINT_BYTES <= config.max_bytes);
    }
}

proptest! {
    #[test]
    fn stale_sensor_is_evicted_before_newer_history(
        fast_samples in 2u64..50,
        budget in 1u64..10,
    ) {
        let config = RetentionConfig {
            interval: Duration::from_secs(1),
            max_age: Duration::from_secs(3600),
            max_bytes: budget * SAMPLE_FOOTPRINT_BYTES,
        };
        let mut store = Store::new(config);
        store.append(Sample::new(NANOS_PER_SEC, "stale", 1.0));
        for t in 2..fast_samples + 2 {
            store.append(Sample::new(t * NANOS_PER_SEC, "fast", 2.0));
        }

        let total = fast_samples + 1;
        prop_assert_eq!(store.len() as u64, total.min(budget));
        // the stale sample is the globally oldest, so it goes first
        prop_assert_eq!(store.series("stale").is_some(), total <= budget);
    }

    #[test]
    fn sub_sample_budget_keeps_newest_per_sensor(
        appends in arb_appends(),
        max_bytes in 1u64..SAMPLE_FOOTPRINT_BYTES,
    ) {
        let config = RetentionConfig {
            interval: Duration::from_secs(1),
            max_age: Duration::from_secs(3600),
            max_bytes,
        };
        let mut store = Store::new(config);
        let mut now = NANOS_PER_SEC;
        let mut newest: BTreeMap<&str, u64> = BTreeMap::new();

        for (step, sensor, value) in appends {
            now += ms(step);
            if store.append(Sample::new(now, SENSORS[sensor], value)) == AppendOutcome::Appended {
                newest.insert(SENSORS[sensor], now);
            }
        }

        for (id, ts) in newest {
            let series = store.series(id).unwrap();
            prop_assert_eq!(series.len(), 1);
            prop_assert_eq!(series.newest(), Some(ts));
        }
    }
}
