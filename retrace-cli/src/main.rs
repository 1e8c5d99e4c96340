//! CLI for the retrace sensor history engine.
//!
//! Provides commands for recording, inspecting, querying, exporting, and
//! benchmarking retrace snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use retrace::source::SyntheticSource;
use retrace::{
    CsvExporter, EngineConfig, RetentionConfig, Sampler, SensorSelection, SharedStore, Store,
};
use tracing_subscriber::EnvFilter;

/// retrace: bounded historical recording of sensor readings.
#[derive(Parser)]
#[command(name = "retrace", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Record synthetic sensor readings into a snapshot.
    Record {
        /// Path of the snapshot file to create or extend.
        #[arg(long)]
        snapshot: PathBuf,

        /// Engine configuration file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,

        /// How long to record (e.g., "30s", "5m").
        #[arg(long, default_value = "30s")]
        duration: String,

        /// Sampling interval (e.g., "500ms", "1s"). Overrides the config file.
        #[arg(long)]
        interval: Option<String>,

        /// Maximum sample age (e.g., "1h"). Overrides the config file.
        #[arg(long)]
        max_age: Option<String>,

        /// Byte budget for all series. Overrides the config file.
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Comma-separated sensor ids to record (default: all).
        #[arg(long, value_delimiter = ',')]
        sensors: Vec<String>,
    },

    /// Display snapshot contents: sensors, sample counts, footprint, stats.
    Info {
        /// Path to the snapshot file.
        snapshot: PathBuf,
    },

    /// Query sensor history from a snapshot.
    Query {
        /// Path to the snapshot file.
        snapshot: PathBuf,

        /// Sensor ids to query.
        #[arg(required = true)]
        sensors: Vec<String>,

        /// Time range to query, ending at the newest sample (e.g., "1h", "30m").
        #[arg(long, default_value = "1h")]
        range: String,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Export sensor history from a snapshot as CSV.
    Export {
        /// Path to the snapshot file.
        snapshot: PathBuf,

        /// Sensor ids to export.
        #[arg(required = true)]
        sensors: Vec<String>,

        /// Time range to export, ending at the newest sample.
        #[arg(long, default_value = "1h", conflicts_with = "all")]
        range: String,

        /// Export the whole retained history.
        #[arg(long)]
        all: bool,

        /// Output file (default: stdout).
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Decimal places per value.
        #[arg(long, default_value_t = retrace::export::DEFAULT_PRECISION)]
        precision: usize,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of data points to write.
        #[arg(long, default_value = "10000000")]
        points: u64,

        /// Number of sensors.
        #[arg(long, default_value = "30")]
        sensors: u32,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object per sensor.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Record {
            snapshot,
            config,
            duration,
            interval,
            max_age,
            max_bytes,
            sensors,
        } => cmd_record(
            &snapshot,
            config.as_deref(),
            &duration,
            interval.as_deref(),
            max_age.as_deref(),
            max_bytes,
            sensors,
        ),
        Commands::Info { snapshot } => cmd_info(&snapshot),
        Commands::Query {
            snapshot,
            sensors,
            range,
            format,
        } => cmd_query(&snapshot, &sensors, &range, &format),
        Commands::Export {
            snapshot,
            sensors,
            range,
            all,
            output,
            precision,
        } => cmd_export(&snapshot, &sensors, (!all).then_some(range.as_str()), output.as_deref(), precision),
        Commands::Bench { points, sensors } => cmd_bench(points, sensors),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `retrace record`.
fn cmd_record(
    snapshot: &Path,
    config_path: Option<&Path>,
    duration: &str,
    interval: Option<&str>,
    max_age: Option<&str>,
    max_bytes: Option<u64>,
    sensors: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(interval) = interval {
        config.retention.interval = parse_duration(interval)?;
    }
    if let Some(max_age) = max_age {
        config.retention.max_age = parse_duration(max_age)?;
    }
    if let Some(max_bytes) = max_bytes {
        config.retention.max_bytes = max_bytes;
    }
    if !sensors.is_empty() {
        config.selection = SensorSelection::only(sensors.iter().cloned());
    }
    config.snapshot_path = Some(snapshot.to_path_buf());
    config.validate()?;
    tracing::debug!(?config, "engine config");

    let source = match &config.selection {
        SensorSelection::Only(ids) => SyntheticSource::new(ids.iter().cloned()),
        SensorSelection::All => SyntheticSource::default(),
    };

    let store = SharedStore::new(Store::open(snapshot, config.retention)?);
    let mut sampler = Sampler::new(store.clone(), Arc::new(source));

    let run_for = parse_duration(duration)?;
    println!("Recording to {} for {duration}...", snapshot.display());
    println!(
        "  Interval: {}, max age: {}, max bytes: {}",
        format_duration(config.retention.interval),
        format_duration(config.retention.max_age),
        format_bytes(config.retention.max_bytes)
    );

    sampler.enable_with(&config)?;
    std::thread::sleep(run_for);
    sampler.disable()?;

    let stats = sampler.stats();
    println!();
    println!("Results:");
    println!("  Ticks: {} ({} coalesced)", stats.ticks, stats.coalesced);
    println!("  Appended: {}", stats.appended);
    println!("  Rejected: {}", stats.rejected);
    println!("  Read failures: {}", stats.read_failures);
    println!("  Unavailable readings: {}", stats.unavailable);
    println!("  Retained samples: {}", store.read().len());

    Ok(())
}

/// Implements `retrace info <snapshot>`.
fn cmd_info(snapshot: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(snapshot)?;
    let config = store.config();

    println!("Snapshot: {}", snapshot.display());
    println!();
    println!("Retention:");
    println!("  Interval: {}", format_duration(config.interval));
    println!("  Max age: {}", format_duration(config.max_age));
    println!("  Max bytes: {} ({} bytes)", format_bytes(config.max_bytes), config.max_bytes);
    println!("  Capacity: {} samples", config.sample_capacity());
    println!();
    println!(
        "Footprint: {} ({} samples)",
        format_bytes(store.footprint()),
        store.len()
    );

    let ids: Vec<&str> = store.sensor_ids().collect();
    println!();
    println!("Sensors: {}", ids.len());
    for id in ids {
        let Some(series) = store.series(id) else {
            continue;
        };
        let span = match (series.oldest(), series.newest()) {
            (Some(oldest), Some(newest)) => format_duration(Duration::from_nanos(newest - oldest)),
            _ => "-".to_string(),
        };
        print!("  - {id}: {} samples, span {span}", series.len());
        if let Some(stats) = series.stats() {
            print!(
                ", min {:.3}, max {:.3}, avg {:.3}",
                stats.min, stats.max, stats.mean
            );
        }
        println!();
    }

    Ok(())
}

/// Implements `retrace query <snapshot> <sensor>...`.
fn cmd_query(
    snapshot: &Path,
    sensors: &[String],
    range: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(snapshot)?;
    let now = store.retention_clock();
    let result = store.query_recent(sensors, parse_duration(range)?, now)?;

    match format {
        OutputFormat::Csv => {
            for series in &result {
                println!(
                    "# sensor={}, points={}, may_be_incomplete={}",
                    series.sensor_id(),
                    series.len(),
                    series.may_be_incomplete()
                );
            }
            print!("{}", CsvExporter::new().export(&result)?);
        }
        OutputFormat::Json => {
            let series: Vec<serde_json::Value> = result
                .iter()
                .map(|s| {
                    let data: Vec<serde_json::Value> = s
                        .points()
                        .iter()
                        .map(|(ts, val)| {
                            serde_json::json!({
                                "timestamp_ns": ts,
                                "value": val,
                            })
                        })
                        .collect();
                    let (oldest, newest) = s.available_range();
                    serde_json::json!({
                        "sensor": s.sensor_id(),
                        "count": s.len(),
                        "available_range": [oldest, newest],
                        "fully_covered": s.is_fully_covered(),
                        "may_be_incomplete": s.may_be_incomplete(),
                        "data": data,
                    })
                })
                .collect();

            let (start, end) = result.requested_range();
            let output = serde_json::json!({
                "start_ns": start,
                "end_ns": end,
                "series": series,
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `retrace export <snapshot> <sensor>...`.
fn cmd_export(
    snapshot: &Path,
    sensors: &[String],
    range: Option<&str>,
    output: Option<&Path>,
    precision: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(snapshot)?;
    let end = store.retention_clock();
    let start = match range {
        Some(range) => end.saturating_sub(retrace::sample::duration_ns(parse_duration(range)?)),
        None => 0,
    };

    let result = store.query(sensors, start, end)?;
    let exporter = CsvExporter::new().with_precision(precision);

    match output {
        Some(path) => {
            exporter.export_to_path(&result, path)?;
            println!(
                "Exported {} rows for {} sensors to {}",
                result.distinct_timestamps().len(),
                result.series().len(),
                path.display()
            );
        }
        None => print!("{}", exporter.export(&result)?),
    }

    Ok(())
}

/// Implements `retrace bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(points: u64, sensor_count: u32) -> Result<(), Box<dyn std::error::Error>> {
    if sensor_count == 0 {
        return Err("At least one sensor is required".into());
    }

    println!("retrace write-path benchmark");
    println!("  Points: {points}");
    println!("  Sensors: {sensor_count}");
    println!();

    let points_per_sensor = points / u64::from(sensor_count);
    // Budget holds half of the points, so the second half exercises eviction.
    let max_bytes = (points / 2).max(1) * retrace::sample::SAMPLE_FOOTPRINT_BYTES;
    let config = RetentionConfig::new(
        Duration::from_secs(1),
        Duration::from_secs(365 * 86400),
        max_bytes,
    )?;
    let mut store = Store::new(config);

    let ids: Vec<String> = (0..sensor_count).map(|i| format!("sensor_{i}")).collect();

    println!("Writing {points} data points across {sensor_count} sensors...");

    let base_time = 1_700_000_000_000_000_000u64;
    let mut ts = base_time;
    let mut evicted = 0usize;

    let start = Instant::now();

    for _ in 0..points_per_sensor {
        ts += 1_000_000_000;
        let outcome = store.append_batch(ts, ids.iter().enumerate().map(|(i, id)| (id, i as f64)));
        evicted += outcome.evicted_by_age + outcome.evicted_by_size;
    }

    let elapsed = start.elapsed();
    let total_writes = points_per_sensor * u64::from(sensor_count);
    let ns_per_write = elapsed.as_nanos() as f64 / total_writes.max(1) as f64;
    let writes_per_sec = total_writes as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results:");
    println!("  Total writes: {total_writes}");
    println!("  Evicted: {evicted}");
    println!("  Retained: {} ({})", store.len(), format_bytes(store.footprint()));
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_write:.1} ns/write");
    println!("  Throughput: {writes_per_sec:.0} writes/sec");

    Ok(())
}

/// Loads a snapshot that must already exist, keeping its stored retention.
fn open_existing(snapshot: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !snapshot.exists() {
        return Err(format!("No snapshot found at '{}'", snapshot.display()).into());
    }
    let config = stored_config(snapshot)?;
    Ok(Store::load(snapshot, config)?)
}

/// Reads the retention section of a snapshot.
fn stored_config(snapshot: &Path) -> Result<RetentionConfig, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(snapshot)?;
    let meta: serde_json::Value = serde_json::from_str(&data)?;
    let config = meta
        .get("config")
        .ok_or_else(|| format!("'{}' has no retention config", snapshot.display()))?;
    Ok(serde_json::from_value(config.clone())?)
}

/// Parses a human-readable duration string (e.g., "500ms", "1h", "30m", "7d").
fn parse_duration(s: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".into());
    }

    if let Some(millis) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(millis.parse()?));
    }

    let unit_at = s.char_indices().last().map_or(0, |(i, _)| i);
    let (num_str, unit) = s.split_at(unit_at);
    let num: u64 = num_str.parse()?;

    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use ms, s, m, h, or d.").into()),
    };
    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Duration '{s}' is too large"))?;

    Ok(Duration::from_secs(secs))
}

/// Formats a duration in the largest whole unit.
fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{duration:?}");
    }
    let secs = duration.as_secs();
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("abcs").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        let huge = format!("{}d", u64::MAX / 86400 + 1);
        assert!(parse_duration(&huge).is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(86400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(100 * 1_048_576), "100.0 MB");
    }
}
