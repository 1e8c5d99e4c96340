//! Example demonstrating live recording with concurrent queries.
//!
//! This example shows how to:
//! - Map raw metric keys to stable sensor ids
//! - Record a subset of sensors on a fixed interval
//! - Query recent history while the sampler keeps writing
//! - Export the retained history as CSV

use retrace::error::Result;
use retrace::source::{FnSource, MappedSource, Readings};
use retrace::{CsvExporter, RetentionConfig, Sampler, SensorSelection, SharedStore, Store};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn main() -> Result<()> {
    println!("retrace live recording example");

    // Raw metrics as a hardware poller would report them
    let counter = AtomicU32::new(0);
    let raw = FnSource::new(move || {
        let i = f64::from(counter.fetch_add(1, Ordering::Relaxed));
        let mut readings = Readings::new();
        readings.insert("cpu_percent".to_string(), Some(35.0 + 10.0 * (i * 0.3).sin()));
        readings.insert("cpu_temp".to_string(), Some(48.0 + i * 0.1));
        readings.insert("ram_percent".to_string(), Some(61.5));
        // GPU sensor drops out every fourth read
        let gpu = if i % 4.0 == 0.0 { None } else { Some(55.0 + (i * 0.5).cos()) };
        readings.insert("gpu_core_temp".to_string(), gpu);
        readings.insert("uptime_secs".to_string(), Some(i));
        Ok(readings)
    });
    let source = MappedSource::with_default_metrics(raw);

    // 100ms ticks, keep 2s of history, at most 64 samples
    let config = RetentionConfig::new(
        Duration::from_millis(100),
        Duration::from_secs(2),
        64 * retrace::sample::SAMPLE_FOOTPRINT_BYTES,
    )?;
    let store = SharedStore::new(Store::new(config));
    let mut sampler = Sampler::new(store.clone(), Arc::new(source));

    sampler.enable(config, SensorSelection::only(["cpu", "cpu_temp", "gpu"]))?;
    println!("Recording cpu, cpu_temp and gpu every 100ms");

    for second in 1..=3 {
        std::thread::sleep(Duration::from_secs(1));

        let guard = store.read();
        let now = guard.retention_clock();
        let result = guard.query_recent(&["cpu", "gpu"], Duration::from_secs(1), now)?;
        println!("\nAfter {second}s ({} samples retained):", guard.len());
        for series in &result {
            let latest = series.points().last().map(|&(_, v)| v);
            println!(
                "  {}: {} points in the last second, latest={latest:?}",
                series.sensor_id(),
                series.len()
            );
        }
    }

    sampler.disable()?;
    let stats = sampler.stats();
    println!(
        "\nSampler: {} ticks, {} appended, {} coalesced",
        stats.ticks, stats.appended, stats.coalesced
    );

    let end = store.read().retention_clock();
    let csv = store.export(&["cpu", "cpu_temp", "gpu"], 0, end, &CsvExporter::new().with_precision(1))?;
    println!("\nRetained history as CSV:\n{csv}");

    Ok(())
}
