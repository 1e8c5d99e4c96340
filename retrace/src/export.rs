//! CSV export of query results.
//!
//! The exported table has one column per requested sensor and one row per
//! distinct timestamp found in any of them:
//!
//! ```text
//! timestamp_ns,cpu_temp,gpu_temp
//! 5000000000,41.500,
//! 6000000000,41.750,63.000
//! ```
//!
//! A cell is empty when its sensor has no sample at exactly that timestamp.
//! Values are never resampled or interpolated.
//!
//! # Example
//!
//! ```rust
//! use retrace::{CsvExporter, RetentionConfig, Sample, Store};
//! use retrace::sample::secs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::new(RetentionConfig::default());
//! store.append(Sample::new(secs(5), "cpu_temp", 41.5));
//!
//! let result = store.query(&["cpu_temp", "gpu_temp"], secs(0), secs(10))?;
//! let csv = CsvExporter::new().export(&result)?;
//! assert_eq!(csv, "timestamp_ns,cpu_temp,gpu_temp\n5000000000,41.500,\n");
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::{Terminator, WriterBuilder};

use crate::error::{ExportError, Result};
use crate::query::QueryResult;

/// Decimal places written for each value unless overridden.
pub const DEFAULT_PRECISION: usize = 3;

/// Header of the timestamp column.
pub const TIMESTAMP_COLUMN: &str = "timestamp_ns";

/// Formats query results as CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvExporter {
    precision: usize,
}

impl CsvExporter {
    /// Creates an exporter with [`DEFAULT_PRECISION`].
    pub fn new() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }

    /// Sets the number of decimal places per value.
    #[must_use]
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Decimal places per value.
    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Renders `result` as a CSV string.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] if the CSV writer fails.
    pub fn export(&self, result: &QueryResult) -> Result<String> {
        let mut buf = Vec::new();
        self.write(result, &mut buf)?;
        String::from_utf8(buf).map_err(|e| ExportError::from(e).into())
    }

    /// Writes `result` as CSV into `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] if writing or flushing fails.
    pub fn write<W: Write>(&self, result: &QueryResult, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(writer);

        let mut header = Vec::with_capacity(result.series().len() + 1);
        header.push(TIMESTAMP_COLUMN);
        header.extend(result.sensor_ids());
        wtr.write_record(&header).map_err(ExportError::from)?;

        // One cursor per series; every series is sorted, so each row only
        // has to look at the cursor heads.
        let mut cursors = vec![0usize; result.series().len()];
        let mut row: Vec<String> = Vec::with_capacity(header.len());

        for timestamp in result.distinct_timestamps() {
            row.clear();
            row.push(timestamp.to_string());

            for (series, cursor) in result.iter().zip(cursors.iter_mut()) {
                let cell = match series.points().get(*cursor) {
                    Some(&(ts, value)) if ts == timestamp => {
                        *cursor += 1;
                        self.format_value(value)
                    }
                    _ => String::new(),
                };
                row.push(cell);
            }

            wtr.write_record(&row).map_err(ExportError::from)?;
        }

        wtr.flush().map_err(ExportError::Flush)?;
        Ok(())
    }

    /// Writes `result` as CSV to a file, replacing it if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the file cannot be created, or any
    /// error from [`CsvExporter::write`].
    pub fn export_to_path<P: AsRef<Path>>(&self, result: &QueryResult, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ExportError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.write(result, BufWriter::new(file))?;

        tracing::info!(
            path = %path.display(),
            sensors = result.series().len(),
            rows = result.distinct_timestamps().len(),
            "exported csv"
        );
        Ok(())
    }

    fn format_value(&self, value: f64) -> String {
        if value.is_finite() {
            format!("{value:.prec$}", prec = self.precision)
        } else {
            String::new()
        }
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::sample::{Sample, secs};
    use crate::store::Store;

    fn store_with(samples: &[(u64, &str, f64)]) -> Store {
        let mut store = Store::new(RetentionConfig::default());
        for &(t, id, v) in samples {
            store.append(Sample::new(secs(t), id, v));
        }
        store
    }

    #[test]
    fn test_csv_export_empty_is_header_only() {
        let store = Store::new(RetentionConfig::default());
        let result = store.query(&["cpu_temp", "gpu_temp"], 0, secs(10)).unwrap();
        let csv = CsvExporter::new().export(&result).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["timestamp_ns,cpu_temp,gpu_temp"]);
    }

    #[test]
    fn test_missing_value_is_empty_cell() {
        let store = store_with(&[(5, "cpu_temp", 41.5), (6, "cpu_temp", 42.0), (6, "gpu_temp", 63.0)]);
        let result = store.query(&["cpu_temp", "gpu_temp"], 0, secs(10)).unwrap();
        let csv = CsvExporter::new().export(&result).unwrap();

        assert_eq!(
            csv,
            "timestamp_ns,cpu_temp,gpu_temp\n\
             5000000000,41.500,\n\
             6000000000,42.000,63.000\n"
        );
    }

    #[test]
    fn test_rows_are_union_of_timestamps_in_order() {
        let store = store_with(&[(1, "a", 1.0), (3, "a", 3.0), (2, "b", 2.0), (3, "b", 3.5)]);
        let result = store.query(&["b", "a"], 0, secs(10)).unwrap();
        let csv = CsvExporter::new().with_precision(1).export(&result).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp_ns,b,a");
        assert_eq!(lines[1], "1000000000,,1.0");
        assert_eq!(lines[2], "2000000000,2.0,");
        assert_eq!(lines[3], "3000000000,3.5,3.0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_output_parses_back() {
        let store = store_with(&[(1, "cpu", 12.25), (2, "cpu", 13.5)]);
        let result = store.query(&["cpu"], 0, secs(10)).unwrap();
        let csv = CsvExporter::new().with_precision(2).export(&result).unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["timestamp_ns", "cpu"]);
        let values: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[1].parse().unwrap())
            .collect();
        assert_eq!(values, vec![12.25, 13.5]);
    }

    #[test]
    fn test_sensor_id_with_comma_is_quoted() {
        let store = store_with(&[(1, "disk,sda", 1.0)]);
        let result = store.query(&["disk,sda"], 0, secs(10)).unwrap();
        let csv = CsvExporter::new().export(&result).unwrap();
        assert!(csv.starts_with("timestamp_ns,\"disk,sda\"\n"));
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let store = store_with(&[(1, "cpu", 1.0)]);
        let result = store.query(&["cpu"], 0, secs(10)).unwrap();

        CsvExporter::new().export_to_path(&result, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "timestamp_ns,cpu\n1000000000,1.000\n");

        let bad = dir.path().join("missing").join("out.csv");
        assert!(CsvExporter::new().export_to_path(&result, &bad).is_err());
    }
}
