//! Sensor sources: where the sampler gets its readings.
//!
//! A [`SensorSource`] answers one question per tick: what is every sensor
//! reading right now? A missing value (`None`) means the sensor is
//! temporarily unavailable and is simply skipped for that tick.
//!
//! The adapters here cover the common cases:
//!
//! - [`FnSource`] wraps a closure.
//! - [`MappedSource`] renames raw metric keys to stable sensor ids and drops
//!   everything else.
//! - [`SyntheticSource`] produces deterministic waveforms for demos and
//!   benchmarks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SourceError;

/// One tick's readings, keyed by sensor id.
pub type Readings = BTreeMap<String, Option<f64>>;

/// Prefix of user-defined sensors.
pub const CUSTOM_SENSOR_PREFIX: &str = "custom_";

/// Prefix of per-drive temperature sensors.
pub const STORAGE_TEMP_PREFIX: &str = "storage_temp_";

/// Graphable metrics: stable sensor id and the raw key it is read from.
const DEFAULT_METRICS: &[(&str, &str)] = &[
    ("cpu", "cpu_percent"),
    ("cpu_temp", "cpu_temp"),
    ("ram", "ram_percent"),
    ("disk", "disk_percent"),
    ("gpu", "gpu_core_temp"),
    ("gpu_hotspot", "gpu_hotspot_temp"),
    ("gpu_memory_temp", "gpu_memory_temp"),
    ("gpu_vram", "vram_percent"),
    ("gpu_core_clock", "gpu_core_clock"),
    ("gpu_memory_clock", "gpu_memory_clock"),
    ("gpu_power", "gpu_power"),
    ("disk_read", "disk_read_mbps"),
    ("disk_write", "disk_write_mbps"),
    ("net_upload", "net_up_mbps"),
    ("net_download", "net_down_mbps"),
];

/// A provider of current sensor readings.
///
/// Implementations may block; the sampler calls `read_all` on a dedicated
/// thread and bounds the wait with a timeout.
pub trait SensorSource: Send + Sync {
    /// Reads every sensor the source knows about.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if no readings could be produced at all.
    fn read_all(&self) -> Result<Readings, SourceError>;
}

/// A source backed by a closure.
///
/// ```rust
/// use retrace::source::{FnSource, Readings, SensorSource};
///
/// let source = FnSource::new(|| Ok(Readings::from([("cpu".to_string(), Some(12.5))])));
/// assert_eq!(source.read_all().unwrap()["cpu"], Some(12.5));
/// ```
pub struct FnSource<F> {
    read: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<Readings, SourceError> + Send + Sync,
{
    /// Wraps `read` as a sensor source.
    pub fn new(read: F) -> Self {
        Self { read }
    }
}

impl<F> SensorSource for FnSource<F>
where
    F: Fn() -> Result<Readings, SourceError> + Send + Sync,
{
    fn read_all(&self) -> Result<Readings, SourceError> {
        (self.read)()
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

/// Returns the default map from sensor id to raw metric key.
pub fn default_metric_map() -> BTreeMap<String, String> {
    DEFAULT_METRICS
        .iter()
        .map(|&(id, raw)| (id.to_string(), raw.to_string()))
        .collect()
}

/// Renames the raw keys of an inner source to stable sensor ids.
///
/// Only mapped keys are kept:
///
/// - metric keys from the metric map (`cpu_percent` becomes `cpu`)
/// - custom sensors registered with [`MappedSource::with_custom_sensor`],
///   reported as `custom_<id>`
/// - raw keys starting with [`STORAGE_TEMP_PREFIX`], passed through unchanged
#[derive(Debug)]
pub struct MappedSource<S> {
    inner: S,
    metrics: BTreeMap<String, String>,
    custom: BTreeMap<String, String>,
}

impl<S: SensorSource> MappedSource<S> {
    /// Maps `inner` with the given `sensor id -> raw key` table.
    pub fn new(inner: S, metrics: BTreeMap<String, String>) -> Self {
        Self {
            inner,
            metrics,
            custom: BTreeMap::new(),
        }
    }

    /// Maps `inner` with [`default_metric_map`].
    pub fn with_default_metrics(inner: S) -> Self {
        Self::new(inner, default_metric_map())
    }

    /// Registers a custom sensor: raw key `identifier` is reported as
    /// `custom_<sensor_id>`.
    #[must_use]
    pub fn with_custom_sensor(mut self, identifier: impl Into<String>, sensor_id: &str) -> Self {
        self.custom
            .insert(identifier.into(), format!("{CUSTOM_SENSOR_PREFIX}{sensor_id}"));
        self
    }

    /// The sensor ids this source can report, sorted.
    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .metrics
            .keys()
            .chain(self.custom.values())
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl<S: SensorSource> SensorSource for MappedSource<S> {
    fn read_all(&self) -> Result<Readings, SourceError> {
        let raw = self.inner.read_all()?;
        let mut readings = Readings::new();

        for (id, raw_key) in &self.metrics {
            if let Some(&value) = raw.get(raw_key) {
                readings.insert(id.clone(), value);
            }
        }

        for (raw_key, value) in &raw {
            if let Some(id) = self.custom.get(raw_key) {
                readings.insert(id.clone(), *value);
            } else if raw_key.starts_with(STORAGE_TEMP_PREFIX) {
                readings.insert(raw_key.clone(), *value);
            }
        }

        Ok(readings)
    }
}

/// Deterministic waveform generator.
///
/// Sensor `i` reads `base_i + amplitude_i * sin(2 * pi * n / period)` on
/// call `n`, with a per-sensor phase offset, so repeated runs record the
/// same history.
#[derive(Debug)]
pub struct SyntheticSource {
    sensors: Vec<String>,
    period: u64,
    calls: AtomicU64,
}

impl SyntheticSource {
    /// Sensor ids used by [`SyntheticSource::default`].
    pub const DEFAULT_SENSORS: &'static [&'static str] =
        &["cpu", "cpu_temp", "ram", "gpu", "disk_read", "net_download"];

    /// Creates a generator for the given sensor ids.
    pub fn new<I, S>(sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sensors: sensors.into_iter().map(Into::into).collect(),
            period: 60,
            calls: AtomicU64::new(0),
        }
    }

    /// Sets the waveform period in calls (at least 1).
    #[must_use]
    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period.max(1);
        self
    }

    /// The sensor ids this source reports.
    pub fn sensor_ids(&self) -> &[String] {
        &self.sensors
    }

    #[allow(clippy::cast_precision_loss)] // small indices and call counts
    fn value(&self, index: usize, call: u64) -> f64 {
        let base = 20.0 + 10.0 * index as f64;
        let amplitude = 5.0 + index as f64;
        let phase = (call % self.period) as f64 / self.period as f64 + index as f64 * 0.25;
        base + amplitude * (std::f64::consts::TAU * phase).sin()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SENSORS.iter().copied())
    }
}

impl SensorSource for SyntheticSource {
    fn read_all(&self) -> Result<Readings, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .sensors
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), Some(self.value(i, call))))
            .collect())
    }
}
