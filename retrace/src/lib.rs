//! # retrace
//!
//! Bounded historical recording of sensor readings.
//!
//! retrace samples a set of sensors on a fixed schedule, keeps the recent
//! history of each one in memory under a combined age and size budget, and
//! answers time-range queries and CSV exports over that history while
//! recording continues.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - One global byte budget for all sensors, enforced by evicting the
//!   globally oldest samples first, so fast and slow sensors are treated alike
//! - Samples older than `max_age` are always dropped
//! - Drift-free scheduling: tick `n` is due at `start + n * interval`, and
//!   overruns are coalesced rather than replayed
//! - A hung or panicking sensor source costs one tick, never the schedule
//! - Readers never observe a half-applied append or eviction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use retrace::{CsvExporter, RetentionConfig, Sampler, SensorSelection, SharedStore, Store};
//! use retrace::source::SyntheticSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Sample every second, keep one hour, at most 1 MiB
//! let config = RetentionConfig::new(
//!     Duration::from_secs(1),
//!     Duration::from_secs(3600),
//!     1024 * 1024,
//! )?;
//!
//! let store = SharedStore::new(Store::new(config));
//! let mut sampler = Sampler::new(store.clone(), Arc::new(SyntheticSource::default()));
//! sampler.enable(config, SensorSelection::All)?;
//!
//! std::thread::sleep(Duration::from_secs(10));
//!
//! // Query while recording continues
//! let now = store.read().retention_clock();
//! let result = store.read().query_recent(&["cpu", "gpu"], Duration::from_secs(60), now)?;
//! for series in &result {
//!     println!("{}: {} samples", series.sensor_id(), series.len());
//! }
//!
//! let csv = store.export(&["cpu", "gpu"], 0, now, &CsvExporter::new())?;
//! println!("{csv}");
//!
//! sampler.disable()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`] holds one [`Series`](series::Series) per sensor and applies
//!   retention after every append
//! - [`SharedStore`] is the handle shared by the sampler and readers
//! - [`Sampler`] pulls from a [`SensorSource`] on a fixed schedule
//! - [`QueryResult`] carries per-sensor points plus coverage metadata
//! - [`CsvExporter`] renders a query result as a CSV table
//!
//! ## Modules
//!
//! - [`sample`] - Samples, timestamps, clocks, footprint accounting
//! - [`config`] - Retention and engine configuration
//! - [`series`] - Per-sensor ordered history
//! - [`retention`] - Age and size eviction planning
//! - [`store`] - Store, snapshots, shared handle
//! - [`query`] - Query result types
//! - [`export`] - CSV export
//! - [`source`] - Sensor source trait and adapters
//! - [`sampler`] - Periodic sampler
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod export;
pub mod query;
pub mod retention;
pub mod sample;
pub mod sampler;
pub mod series;
pub mod source;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use config::{EngineConfig, RetentionConfig, SensorSelection};
pub use error::{
    ConfigError, ExportError, QueryError, Result, RetraceError, SamplerError, SourceError,
    StoreError,
};
pub use export::CsvExporter;
pub use query::{QueryResult, SeriesQuery};
pub use sample::{Sample, Timestamp};
pub use sampler::{RecordingSession, Sampler, SamplerStats};
pub use source::{Readings, SensorSource};
pub use store::{AppendOutcome, BatchOutcome, SharedStore, Store};
