//! Error types for the retrace sensor history engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for all retrace operations.
///
/// Each variant wraps the error enum of one concern. Running out of byte
/// budget is deliberately absent: retention eviction absorbs it and it never
/// surfaces to callers.
#[derive(Error, Debug)]
pub enum RetraceError {
    /// Invalid retention or engine configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error during a query (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error while serializing a query result to CSV.
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Error saving or loading a store snapshot.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error starting or controlling the sampler.
    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// A sensor source failed to produce readings.
    #[error("sensor source error: {0}")]
    Source(#[from] SourceError),
}

/// Errors raised when a configuration is rejected.
///
/// A rejected configuration never starts the sampler.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The sampling interval is zero.
    #[error("sampling interval must be positive")]
    ZeroInterval,

    /// The maximum sample age is zero.
    #[error("max_age must be positive")]
    ZeroMaxAge,

    /// The byte budget is zero.
    #[error("max_bytes must be positive")]
    ZeroMaxBytes,

    /// The sensor read timeout is zero.
    #[error("read timeout must be positive")]
    ZeroReadTimeout,

    /// A duration is too large to be expressed in nanoseconds.
    #[error("{field} of {duration:?} does not fit in u64 nanoseconds")]
    DurationOverflow {
        /// The offending configuration field.
        field: &'static str,
        /// The configured duration.
        duration: Duration,
    },

    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Load {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur during query operations (read path).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The time range is inverted (start > end).
    #[error("invalid time range: start {start} > end {end}")]
    InvalidRange {
        /// The start time.
        start: u64,
        /// The end time.
        end: u64,
    },
}

/// Errors that can occur while exporting to CSV.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("csv writer failed: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the CSV writer into its sink failed.
    #[error("failed to flush csv output: {0}")]
    Flush(#[source] std::io::Error),

    /// The output file could not be created or written.
    #[error("failed to write export '{}': {source}", path.display())]
    Io {
        /// The export file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory CSV buffer was not valid UTF-8.
    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Errors that can occur when saving or loading a snapshot.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The snapshot file could not be read or written.
    #[error("snapshot I/O failed for '{}': {source}", path.display())]
    Io {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the snapshot.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The snapshot file is corrupted or invalid.
    #[error("corrupted snapshot '{}': {reason}", path.display())]
    CorruptedSnapshot {
        /// The snapshot path.
        path: PathBuf,
        /// Description of what was invalid.
        reason: String,
    },
}

/// Errors that can occur when controlling the sampler.
#[derive(Error, Debug)]
pub enum SamplerError {
    /// `enable` was called while a session is already running.
    #[error("sampler is already enabled")]
    AlreadyEnabled,

    /// The driver or reader thread could not be spawned.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Which thread failed to start.
        thread: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by a sensor source.
///
/// The sampler treats every one of these as "sensor unavailable for this
/// tick": it logs and skips, and the scheduling loop keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// A specific sensor has no reading right now.
    #[error("sensor '{sensor}' is unavailable")]
    Unavailable {
        /// The sensor identifier.
        sensor: String,
    },

    /// The source failed to read.
    #[error("sensor read failed: {reason}")]
    ReadFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The source did not answer within the read timeout.
    #[error("sensor read timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The source is still busy with a read that previously timed out.
    #[error("sensor source is still busy with an earlier read")]
    Busy,

    /// The source panicked while reading.
    #[error("sensor source panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

/// Type alias for `Result<T, RetraceError>`.
pub type Result<T> = std::result::Result<T, RetraceError>;
