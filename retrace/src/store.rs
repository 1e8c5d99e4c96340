//! Series store for retrace.
//!
//! The [`Store`] maps each sensor id to its [`Series`] and enforces the
//! retention policy over all of them at once: one byte budget and one age
//! bound apply to the whole store, not per series.
//!
//! # Design
//!
//! - Appends are accepted only in strictly increasing timestamp order per
//!   sensor; a duplicate or older timestamp is dropped without mutation.
//! - Every append (or every batch, once per sampling tick) is followed by an
//!   eviction pass, so the bounds hold whenever a mutating call returns.
//! - The store keeps a retention clock: the newest instant it has evicted
//!   against. It never moves backwards, so a late sample cannot resurrect
//!   history that already aged out.
//! - [`SharedStore`] wraps a store for use from a sampling thread and any
//!   number of readers. Each whole operation runs under one lock, so a
//!   reader never observes a half-applied append or eviction.
//!
//! # Snapshot Layout
//!
//! ```text
//! {
//!   "version": 1,
//!   "config": { "interval": 1.0, "max_age": 3600.0, "max_bytes": 1048576 },
//!   "retention_clock": 1700000000000000000,
//!   "series": { "cpu_temp": [[1700000000000000000, 41.5], ...] }
//! }
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use retrace::{RetentionConfig, Sample, Store};
//! use retrace::sample::secs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetentionConfig::new(Duration::from_secs(1), Duration::from_secs(5), 100_000)?;
//! let mut store = Store::new(config);
//!
//! for i in 1..=10u32 {
//!     store.append(Sample::new(secs(u64::from(i)), "cpu_temp", f64::from(i)));
//! }
//!
//! // Only the five most recent samples are younger than max_age.
//! assert_eq!(store.series_len("cpu_temp"), 5);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RetentionConfig;
use crate::error::{Result, StoreError};
use crate::export::CsvExporter;
use crate::query::{QueryResult, SeriesQuery, dedup_ids, validate_range};
use crate::retention::{EvictionPlan, plan_eviction};
use crate::sample::{Sample, Timestamp, duration_ns};
use crate::series::{Series, SeriesStats};

/// Snapshot file format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The sample was stored (it may have been evicted again right away if
    /// it was already older than `max_age`).
    Appended,
    /// The sample was dropped: its timestamp was not newer than the sensor's
    /// last sample, or its value was not finite.
    Rejected,
}

/// Result of appending one tick's worth of readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Readings stored.
    pub appended: usize,
    /// Readings dropped as duplicate timestamps or non-finite values.
    pub rejected: usize,
    /// Samples evicted because they aged out.
    pub evicted_by_age: usize,
    /// Samples evicted to fit the byte budget.
    pub evicted_by_size: usize,
}

/// Bounded, per-sensor sample history.
#[derive(Debug, Clone)]
pub struct Store {
    /// Retention knobs applied on every eviction pass.
    config: RetentionConfig,
    /// Series keyed by sensor id; BTreeMap keeps eviction ties deterministic.
    series: BTreeMap<String, Series>,
    /// Newest instant retention was evaluated at.
    retention_clock: Timestamp,
}

/// On-disk snapshot of a store.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    config: RetentionConfig,
    retention_clock: Timestamp,
    series: BTreeMap<String, Vec<(Timestamp, f64)>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new(config: RetentionConfig) -> Self {
        Self {
            config,
            series: BTreeMap::new(),
            retention_clock: 0,
        }
    }

    /// Appends one sample, then enforces retention at the sample's timestamp.
    pub fn append(&mut self, sample: Sample) -> AppendOutcome {
        let outcome = self.insert(&sample.sensor_id, sample.timestamp, sample.value);
        self.enforce_retention(sample.timestamp);
        outcome
    }

    /// Appends all readings of one tick at `timestamp`, then runs a single
    /// eviction pass.
    pub fn append_batch<I, S>(&mut self, timestamp: Timestamp, readings: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut outcome = BatchOutcome::default();
        for (sensor_id, value) in readings {
            match self.insert(sensor_id.as_ref(), timestamp, value) {
                AppendOutcome::Appended => outcome.appended += 1,
                AppendOutcome::Rejected => outcome.rejected += 1,
            }
        }

        let plan = self.enforce_retention(timestamp);
        outcome.evicted_by_age = plan.by_age();
        outcome.evicted_by_size = plan.by_size();
        outcome
    }

    fn insert(&mut self, sensor_id: &str, timestamp: Timestamp, value: f64) -> AppendOutcome {
        if !value.is_finite() {
            tracing::trace!(sensor = sensor_id, value, "dropping non-finite reading");
            return AppendOutcome::Rejected;
        }

        let accepted = match self.series.get_mut(sensor_id) {
            Some(series) => series.push(timestamp, value),
            None => {
                let mut series = Series::new();
                series.push(timestamp, value);
                self.series.insert(sensor_id.to_string(), series);
                true
            }
        };

        if accepted {
            AppendOutcome::Appended
        } else {
            tracing::trace!(sensor = sensor_id, timestamp, "dropping non-increasing timestamp");
            AppendOutcome::Rejected
        }
    }

    /// Runs one eviction pass at `now` and returns what was evicted.
    ///
    /// `now` is clamped to the retention clock, which only moves forward.
    pub fn enforce_retention(&mut self, now: Timestamp) -> EvictionPlan {
        self.retention_clock = self.retention_clock.max(now);

        let views: Vec<&Series> = self.series.values().collect();
        let plan = plan_eviction(&views, self.retention_clock, &self.config);
        if plan.is_empty() {
            return plan;
        }

        for (series, &drop) in self.series.values_mut().zip(plan.drops()) {
            series.evict_front(drop);
        }
        self.series.retain(|_, series| !series.is_empty());

        tracing::debug!(
            by_age = plan.by_age(),
            by_size = plan.by_size(),
            footprint = self.footprint(),
            "evicted samples"
        );
        plan
    }

    /// Returns the samples of each requested sensor within `[start, end]`.
    ///
    /// Unknown sensors yield empty series. Repeated ids are collapsed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::QueryError::InvalidRange`] if `start > end`.
    pub fn query<S: AsRef<str>>(
        &self,
        sensor_ids: &[S],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<QueryResult> {
        validate_range(start, end)?;

        let series = dedup_ids(sensor_ids)
            .into_iter()
            .map(|id| SeriesQuery::from_series(id, self.series.get(id), start, end))
            .collect();

        Ok(QueryResult::new(series, (start, end)))
    }

    /// Returns the samples of each requested sensor within the last `window`
    /// before `now`, for live graphs.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the range is always ordered.
    pub fn query_recent<S: AsRef<str>>(
        &self,
        sensor_ids: &[S],
        window: Duration,
        now: Timestamp,
    ) -> Result<QueryResult> {
        let start = now.saturating_sub(duration_ns(window));
        self.query(sensor_ids, start, now)
    }

    /// Removes all history.
    pub fn clear(&mut self) {
        let dropped = self.len();
        self.series.clear();
        tracing::info!(dropped, "cleared store");
    }

    /// Removes one sensor's history, returning how many samples were dropped.
    pub fn clear_sensor(&mut self, sensor_id: &str) -> usize {
        self.series.remove(sensor_id).map_or(0, |s| s.len())
    }

    /// Replaces the retention configuration.
    ///
    /// The new bounds apply from the next eviction pass.
    pub fn set_config(&mut self, config: RetentionConfig) {
        self.config = config;
    }

    /// The active retention configuration.
    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// The newest instant retention was evaluated at.
    pub fn retention_clock(&self) -> Timestamp {
        self.retention_clock
    }

    /// Sensor ids with retained history, sorted.
    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// The series of one sensor.
    pub fn series(&self, sensor_id: &str) -> Option<&Series> {
        self.series.get(sensor_id)
    }

    /// Number of samples retained for one sensor.
    pub fn series_len(&self, sensor_id: &str) -> usize {
        self.series.get(sensor_id).map_or(0, Series::len)
    }

    /// Summary statistics of one sensor's retained history.
    pub fn stats(&self, sensor_id: &str) -> Option<SeriesStats> {
        self.series.get(sensor_id).and_then(Series::stats)
    }

    /// Total samples across all series.
    pub fn len(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    /// Whether the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Accounted byte footprint of all series.
    pub fn footprint(&self) -> u64 {
        self.series.values().map(Series::footprint).sum()
    }

    /// Opens the snapshot at `path`, or creates an empty store if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if an existing snapshot cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(path: P, config: RetentionConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path, config)
        } else {
            Ok(Self::new(config))
        }
    }

    /// Loads a snapshot and re-applies retention under `config`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the file cannot be read
    /// - [`StoreError::CorruptedSnapshot`] if it is not a valid snapshot
    pub fn load<P: AsRef<Path>>(path: P, config: RetentionConfig) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let snapshot: Snapshot =
            serde_json::from_str(&data).map_err(|e| StoreError::CorruptedSnapshot {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::CorruptedSnapshot {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported snapshot version: expected {}, found {}",
                    SNAPSHOT_VERSION, snapshot.version
                ),
            }
            .into());
        }

        let series = snapshot
            .series
            .into_iter()
            .map(|(id, points)| {
                let points = points.into_iter().filter(|(_, v)| v.is_finite()).collect();
                (id, Series::from_points(points))
            })
            .filter(|(_, s)| !s.is_empty())
            .collect();

        let mut store = Self {
            config,
            series,
            retention_clock: 0,
        };
        store.enforce_retention(snapshot.retention_clock);

        tracing::info!(
            path = %path.display(),
            sensors = store.series.len(),
            samples = store.len(),
            "loaded snapshot"
        );
        Ok(store)
    }

    /// Writes a snapshot to `path`, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the file write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            config: self.config,
            retention_clock: self.retention_clock,
            series: self
                .series
                .iter()
                .map(|(id, s)| (id.clone(), s.iter().collect()))
                .collect(),
        };
        let data = serde_json::to_vec(&snapshot).map_err(StoreError::Serialize)?;

        let tmp_path = temp_path(path);
        fs::write(&tmp_path, data).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::info!(path = %path.display(), samples = self.len(), "saved snapshot");
        Ok(())
    }
}

/// Sibling path used for atomic snapshot writes.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Cloneable handle to a store shared between the sampler and readers.
///
/// Every method holds the lock for one whole store operation. A poisoned
/// lock is recovered: each store operation restores the invariants before
/// returning, so the state behind a poisoned lock is still consistent.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<Store>>,
}

impl SharedStore {
    /// Wraps a store for shared access.
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Acquires shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a tick's readings and evicts, as one atomic operation.
    pub fn append_batch<I, S>(&self, timestamp: Timestamp, readings: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        self.write().append_batch(timestamp, readings)
    }

    /// Appends one sample and evicts, as one atomic operation.
    pub fn append(&self, sample: Sample) -> AppendOutcome {
        self.write().append(sample)
    }

    /// Runs a range query under the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`crate::QueryError::InvalidRange`] if `start > end`.
    pub fn query<S: AsRef<str>>(
        &self,
        sensor_ids: &[S],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<QueryResult> {
        self.read().query(sensor_ids, start, end)
    }

    /// Queries and formats CSV in one read-locked operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is invalid or CSV formatting fails. The
    /// store is never modified.
    pub fn export<S: AsRef<str>>(
        &self,
        sensor_ids: &[S],
        start: Timestamp,
        end: Timestamp,
        exporter: &CsvExporter,
    ) -> Result<String> {
        let guard = self.read();
        let result = guard.query(sensor_ids, start, end)?;
        exporter.export(&result)
    }

    /// Removes all history.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Replaces the retention configuration; effective at the next eviction pass.
    pub fn set_config(&self, config: RetentionConfig) {
        self.write().set_config(config);
    }

    /// Writes a snapshot of the current contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.read().save(path)
    }
}

impl From<Store> for SharedStore {
    fn from(store: Store) -> Self {
        Self::new(store)
    }
}
