//! Configuration types for retrace.
//!
//! [`RetentionConfig`] holds the three knobs the engine consumes: the
//! sampling interval, the maximum sample age, and the global byte budget.
//! [`EngineConfig`] bundles it with the sampler's read timeout, the sensor
//! selection, and an optional snapshot path, and can be loaded from a JSON
//! file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default sampling interval (one minute).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default maximum sample age (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Default byte budget (100 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Default bound on a single sensor read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Retention and sampling configuration.
///
/// Supplied when recording is enabled. It may be changed while recording is
/// disabled; a change during recording takes effect on the next eviction
/// pass.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use retrace::config::RetentionConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RetentionConfig::new(
///     Duration::from_secs(1),
///     Duration::from_secs(3600),
///     1024 * 1024,
/// )?;
/// assert_eq!(config.max_bytes, 1024 * 1024);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Time between samples.
    #[serde(with = "duration_serde")]
    pub interval: Duration,

    /// Samples whose age reaches this duration are evicted.
    #[serde(with = "duration_serde")]
    pub max_age: Duration,

    /// Global byte budget shared by all series.
    pub max_bytes: u64,
}

impl RetentionConfig {
    /// Creates a validated retention configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any field is zero or a duration cannot be
    /// represented in nanoseconds.
    pub fn new(interval: Duration, max_age: Duration, max_bytes: u64) -> Result<Self> {
        let config = Self {
            interval,
            max_age,
            max_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval.into());
        }
        if self.max_age.is_zero() {
            return Err(ConfigError::ZeroMaxAge.into());
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::ZeroMaxBytes.into());
        }

        for (field, duration) in [("interval", self.interval), ("max_age", self.max_age)] {
            if u64::try_from(duration.as_nanos()).is_err() {
                return Err(ConfigError::DurationOverflow { field, duration }.into());
            }
        }

        Ok(())
    }

    /// Returns `max_age` in nanoseconds.
    #[allow(clippy::cast_possible_truncation)] // validate() rejects larger values
    pub fn max_age_ns(&self) -> u64 {
        self.max_age.as_nanos() as u64
    }

    /// Returns the maximum number of samples the byte budget admits.
    pub fn sample_capacity(&self) -> u64 {
        self.max_bytes / crate::sample::SAMPLE_FOOTPRINT_BYTES
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Which sensors the sampler records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSelection {
    /// Every sensor the source reports on a tick.
    #[default]
    All,
    /// Only the listed sensors.
    Only(BTreeSet<String>),
}

impl SensorSelection {
    /// Builds a selection of the given sensor ids.
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(ids.into_iter().map(Into::into).collect())
    }

    /// Returns whether `sensor_id` is of interest.
    pub fn includes(&self, sensor_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(sensor_id),
        }
    }
}

/// Full engine configuration, loadable from JSON.
///
/// Omitted fields fall back to their defaults:
///
/// ```json
/// {
///   "retention": { "interval": 1.0, "max_age": 3600.0, "max_bytes": 1048576 },
///   "read_timeout": 0.25,
///   "selection": { "only": ["cpu", "gpu"] },
///   "snapshot_path": "history.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retention and sampling knobs.
    pub retention: RetentionConfig,

    /// Upper bound on one `read_all` call.
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Which sensors to record.
    pub selection: SensorSelection,

    /// Where to persist the store, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            selection: SensorSelection::All,
            snapshot_path: None,
        }
    }
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON for this schema, or a
    /// validation error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the retention section and the read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.retention.validate()?;
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroReadTimeout.into());
        }
        Ok(())
    }
}

/// Serde support for Duration fields.
///
/// Durations are serialized as total seconds (f64) for human readability
/// in JSON configuration files.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_config_validation() {
        assert!(RetentionConfig::new(Duration::from_secs(1), Duration::from_secs(5), 100).is_ok());

        let err = RetentionConfig::new(Duration::ZERO, Duration::from_secs(5), 100).unwrap_err();
        assert!(matches!(
            err,
            crate::RetraceError::Config(ConfigError::ZeroInterval)
        ));

        let err = RetentionConfig::new(Duration::from_secs(1), Duration::ZERO, 100).unwrap_err();
        assert!(matches!(
            err,
            crate::RetraceError::Config(ConfigError::ZeroMaxAge)
        ));

        let err = RetentionConfig::new(Duration::from_secs(1), Duration::from_secs(5), 0).unwrap_err();
        assert!(matches!(
            err,
            crate::RetraceError::Config(ConfigError::ZeroMaxBytes)
        ));
    }

    #[test]
    fn test_duration_overflow_rejected() {
        let config = RetentionConfig {
            interval: Duration::from_secs(1),
            max_age: Duration::MAX,
            max_bytes: 100,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RetentionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_age, Duration::from_secs(86400));
        assert_eq!(config.sample_capacity(), DEFAULT_MAX_BYTES / 16);
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_selection() {
        assert!(SensorSelection::All.includes("anything"));
        let only = SensorSelection::only(["cpu", "gpu"]);
        assert!(only.includes("cpu"));
        assert!(!only.includes("disk"));
    }

    #[test]
    fn test_engine_config_json_roundtrip_with_defaults() {
        let json = r#"{
            "retention": { "interval": 0.5, "max_age": 10.0, "max_bytes": 4096 },
            "selection": { "only": ["cpu_temp"] }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.retention.interval, Duration::from_millis(500));
        assert_eq!(config.retention.max_age, Duration::from_secs(10));
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.selection, SensorSelection::only(["cpu_temp"]));
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_engine_config_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "retention": { "interval": 0.0, "max_age": 10.0, "max_bytes": 4096 } }"#,
        )
        .unwrap();
        assert!(EngineConfig::load(&path).is_err());

        let missing = dir.path().join("missing.json");
        let err = EngineConfig::load(&missing).unwrap_err();
        assert!(matches!(
            err,
            crate::RetraceError::Config(ConfigError::Load { .. })
        ));
    }
}
