//! Periodic sampler: pulls readings from a [`SensorSource`] into the store.
//!
//! # Threads
//!
//! While enabled, the sampler owns two background threads:
//!
//! - the **driver** sleeps until the next tick is due, stamps the tick with
//!   the clock, asks the reader for readings, and appends them to the
//!   [`SharedStore`] in one batch (one eviction pass per tick);
//! - the **reader** calls [`SensorSource::read_all`]. The driver waits for
//!   it at most `read_timeout`, so a hung source cannot stall the schedule.
//!   While a timed-out read is still running, later ticks report the source
//!   as busy instead of queueing behind it.
//!
//! Source errors and panics are logged and count as "every sensor
//! unavailable" for that tick. They never stop the schedule. A selected
//! sensor that is missing from the readings, or reported as `None`, is
//! logged as [`SourceError::Unavailable`] and skipped for that tick.
//!
//! # Scheduling
//!
//! Tick `n` is due at `origin + n * interval`, where `origin` is the instant
//! recording was enabled. Deadlines are never re-armed relative to when a
//! tick finished, so slow reads do not accumulate drift. If a tick overruns
//! one or more deadlines, exactly one tick fires immediately and the skipped
//! deadlines are coalesced into it.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use retrace::{RetentionConfig, Sampler, SensorSelection, SharedStore, Store};
//! use retrace::source::SyntheticSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetentionConfig::new(Duration::from_secs(1), Duration::from_secs(3600), 1 << 20)?;
//! let store = SharedStore::new(Store::new(config));
//! let mut sampler = Sampler::new(store.clone(), Arc::new(SyntheticSource::default()));
//!
//! sampler.enable(config, SensorSelection::only(["cpu", "gpu"]))?;
//! std::thread::sleep(Duration::from_secs(5));
//! sampler.disable()?;
//!
//! println!("recorded {} samples", store.read().len());
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, RetentionConfig, SensorSelection};
use crate::error::{Result, SamplerError, SourceError};
use crate::sample::{Clock, SystemClock, Timestamp, duration_ns};
use crate::source::{Readings, SensorSource};
use crate::store::SharedStore;

/// Parameters of the current recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    /// Clock reading when recording was enabled.
    pub started_at: Timestamp,
    /// Retention configuration in force.
    pub config: RetentionConfig,
    /// Sensors being recorded.
    pub selection: SensorSelection,
    /// Bound on one source read.
    pub read_timeout: Duration,
}

/// Counters for the current recording session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Ticks that ran.
    pub ticks: u64,
    /// Deadlines skipped because an earlier tick overran.
    pub coalesced: u64,
    /// Ticks whose source read failed, timed out, panicked, or was busy.
    pub read_failures: u64,
    /// Readings stored.
    pub appended: u64,
    /// Readings dropped by the store (duplicate timestamp or non-finite).
    pub rejected: u64,
    /// Selected sensors that had no value on a tick that read successfully.
    pub unavailable: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    coalesced: AtomicU64,
    read_failures: AtomicU64,
    appended: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SamplerStats {
        SamplerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.coalesced,
            &self.read_failures,
            &self.appended,
            &self.rejected,
            &self.unavailable,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Fixed-origin tick schedule.
///
/// Works purely in offsets from the origin, so it can be driven by a real
/// [`Instant`] or by simulated time.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval_ns: u64,
    next: u64,
}

impl Ticker {
    /// Creates a schedule whose first tick is due one interval after the origin.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ns: duration_ns(interval).max(1),
            next: 1,
        }
    }

    /// Index of the next tick.
    pub fn next_index(&self) -> u64 {
        self.next
    }

    /// Offset from the origin at which the next tick is due.
    pub fn next_due(&self) -> Duration {
        Duration::from_nanos(self.interval_ns.saturating_mul(self.next))
    }

    /// Records that the due tick finished `elapsed` after the origin and
    /// schedules the following one.
    ///
    /// Returns how many deadlines were coalesced. When deadlines were
    /// missed, the next tick is the latest one already due, so it fires
    /// immediately.
    pub fn complete(&mut self, elapsed: Duration) -> u64 {
        let following = self.next.saturating_add(1);
        let latest_due = duration_ns(elapsed) / self.interval_ns;

        if latest_due >= following {
            self.next = latest_due;
            latest_due - following
        } else {
            self.next = following;
            0
        }
    }
}

enum Command {
    Start,
    Stop,
}

type ReadResult = std::result::Result<Readings, SourceError>;

/// Reader thread plus the bookkeeping for a timed-out read.
struct Reader {
    requests: Option<Sender<()>>,
    replies: Receiver<ReadResult>,
    pending: bool,
    handle: Option<JoinHandle<()>>,
}

impl Reader {
    fn spawn(source: Arc<dyn SensorSource>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<()>();
        let (reply_tx, reply_rx) = mpsc::channel::<ReadResult>();

        let handle = thread::Builder::new()
            .name("retrace-reader".to_string())
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| source.read_all()))
                        .unwrap_or_else(|payload| {
                            Err(SourceError::Panicked {
                                message: panic_message(payload.as_ref()),
                            })
                        });
                    if reply_tx.send(result).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| SamplerError::Spawn {
                thread: "reader",
                source: e,
            })?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            pending: false,
            handle: Some(handle),
        })
    }

    fn read(&mut self, timeout: Duration) -> ReadResult {
        if self.pending {
            match self.replies.try_recv() {
                // The late answer belongs to an earlier tick; discard it.
                Ok(_) => self.pending = false,
                Err(TryRecvError::Empty) => return Err(SourceError::Busy),
                Err(TryRecvError::Disconnected) => return Err(reader_gone()),
            }
        }

        let Some(requests) = &self.requests else {
            return Err(reader_gone());
        };
        if requests.send(()).is_err() {
            return Err(reader_gone());
        }

        match self.replies.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.pending = true;
                Err(SourceError::Timeout { after: timeout })
            }
            Err(RecvTimeoutError::Disconnected) => Err(reader_gone()),
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.requests.take();
        if self.pending {
            // A hung read cannot be interrupted; the thread exits once it returns.
            tracing::warn!("sensor read still in flight, detaching reader thread");
            return;
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("reader thread panicked");
        }
    }
}

fn reader_gone() -> SourceError {
    SourceError::ReadFailed {
        reason: "reader thread exited".to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// State owned by the driver thread.
struct Driver {
    store: SharedStore,
    reader: Reader,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    interval: Duration,
    read_timeout: Duration,
    selection: SensorSelection,
    control: Receiver<Command>,
}

impl Driver {
    fn run(mut self) {
        // Nothing happens until the sampler has committed the session.
        match self.control.recv() {
            Ok(Command::Start) => {}
            Ok(Command::Stop) | Err(_) => return,
        }

        let origin = Instant::now();
        let mut ticker = Ticker::new(self.interval);

        loop {
            let wait = (origin + ticker.next_due()).saturating_duration_since(Instant::now());
            match self.control.recv_timeout(wait) {
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Command::Start) => continue,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.tick(ticker.next_index());

            let coalesced = ticker.complete(origin.elapsed());
            if coalesced > 0 {
                self.counters.coalesced.fetch_add(coalesced, Ordering::Relaxed);
                tracing::debug!(coalesced, "tick overran, coalescing missed deadlines");
            }
        }
    }

    fn tick(&mut self, index: u64) {
        let timestamp = self.clock.now_ns();
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let readings = match self.reader.read(self.read_timeout) {
            Ok(readings) => readings,
            Err(e) => {
                self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(tick = index, error = %e, "sensors unavailable this tick");
                return;
            }
        };

        let mut missing: Vec<String> = match &self.selection {
            SensorSelection::All => Vec::new(),
            SensorSelection::Only(ids) => ids
                .iter()
                .filter(|id| !readings.contains_key(id.as_str()))
                .cloned()
                .collect(),
        };

        let mut available = Vec::with_capacity(readings.len());
        for (id, value) in readings {
            if !self.selection.includes(&id) {
                continue;
            }
            match value {
                Some(v) => available.push((id, v)),
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            self.counters
                .unavailable
                .fetch_add(missing.len() as u64, Ordering::Relaxed);
            for sensor in missing {
                let error = SourceError::Unavailable { sensor };
                tracing::debug!(tick = index, error = %error, "skipping sensor");
            }
        }

        if available.is_empty() {
            tracing::debug!(tick = index, "no sensor readings available");
            return;
        }

        let outcome = self.store.append_batch(timestamp, available);
        self.counters
            .appended
            .fetch_add(outcome.appended as u64, Ordering::Relaxed);
        self.counters
            .rejected
            .fetch_add(outcome.rejected as u64, Ordering::Relaxed);

        tracing::debug!(
            tick = index,
            timestamp,
            appended = outcome.appended,
            rejected = outcome.rejected,
            evicted_by_age = outcome.evicted_by_age,
            evicted_by_size = outcome.evicted_by_size,
            "tick complete"
        );
    }
}

struct Running {
    session: RecordingSession,
    control: Sender<Command>,
    driver: JoinHandle<()>,
}

/// Records sensor readings into a store on a fixed schedule.
pub struct Sampler {
    store: SharedStore,
    source: Arc<dyn SensorSource>,
    clock: Arc<dyn Clock>,
    read_timeout: Duration,
    snapshot_path: Option<PathBuf>,
    counters: Arc<Counters>,
    running: Option<Running>,
}

impl Sampler {
    /// Creates a disabled sampler using the system clock.
    pub fn new(store: SharedStore, source: Arc<dyn SensorSource>) -> Self {
        Self {
            store,
            source,
            clock: Arc::new(SystemClock::new()),
            read_timeout: crate::config::DEFAULT_READ_TIMEOUT,
            snapshot_path: None,
            counters: Arc::new(Counters::default()),
            running: None,
        }
    }

    /// Replaces the clock used to timestamp ticks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the bound on one source read.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Saves a store snapshot to `path` whenever recording is disabled.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Starts recording.
    ///
    /// The configuration is validated first; a rejected configuration leaves
    /// the sampler disabled and the store untouched.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError`] if `config` is invalid
    /// - [`SamplerError::AlreadyEnabled`] if recording is already running
    /// - [`SamplerError::Spawn`] if a background thread cannot start
    pub fn enable(&mut self, config: RetentionConfig, selection: SensorSelection) -> Result<()> {
        if self.running.is_some() {
            return Err(SamplerError::AlreadyEnabled.into());
        }
        config.validate()?;

        let mut read_timeout = self.read_timeout;
        if read_timeout.is_zero() {
            return Err(crate::error::ConfigError::ZeroReadTimeout.into());
        }
        if read_timeout > config.interval {
            tracing::warn!(
                read_timeout = ?read_timeout,
                interval = ?config.interval,
                "read timeout exceeds interval, clamping"
            );
            read_timeout = config.interval;
        }

        let reader = Reader::spawn(Arc::clone(&self.source))?;
        let (control_tx, control_rx) = mpsc::channel();

        let driver = Driver {
            store: self.store.clone(),
            reader,
            clock: Arc::clone(&self.clock),
            counters: Arc::clone(&self.counters),
            interval: config.interval,
            read_timeout,
            selection: selection.clone(),
            control: control_rx,
        };
        let handle = thread::Builder::new()
            .name("retrace-sampler".to_string())
            .spawn(move || driver.run())
            .map_err(|e| SamplerError::Spawn {
                thread: "sampler",
                source: e,
            })?;

        self.store.set_config(config);
        self.counters.reset();
        if control_tx.send(Command::Start).is_err() {
            tracing::warn!("sampler thread exited before start");
        }

        let session = RecordingSession {
            started_at: self.clock.now_ns(),
            config,
            selection,
            read_timeout,
        };
        tracing::info!(
            interval = ?config.interval,
            max_age = ?config.max_age,
            max_bytes = config.max_bytes,
            "recording enabled"
        );

        self.running = Some(Running {
            session,
            control: control_tx,
            driver: handle,
        });
        Ok(())
    }

    /// Starts recording with the settings of an [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Same as [`Sampler::enable`], plus [`crate::ConfigError::ZeroReadTimeout`].
    pub fn enable_with(&mut self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        self.read_timeout = config.read_timeout;
        if let Some(path) = &config.snapshot_path {
            self.snapshot_path = Some(path.clone());
        }
        self.enable(config.retention, config.selection.clone())
    }

    /// Stops recording.
    ///
    /// Waits for an in-flight tick to finish; no tick starts after this
    /// returns. Calling it while disabled does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError`] if a snapshot path is set and saving fails.
    pub fn disable(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The driver may already be gone if it panicked; join reports that.
        let _ = running.control.send(Command::Stop);
        if running.driver.join().is_err() {
            tracing::warn!("sampler thread panicked");
        }

        let stats = self.counters.snapshot();
        tracing::info!(
            ticks = stats.ticks,
            appended = stats.appended,
            read_failures = stats.read_failures,
            "recording disabled"
        );

        if let Some(path) = &self.snapshot_path {
            self.store.save(path)?;
        }
        Ok(())
    }

    /// Replaces the retention configuration.
    ///
    /// While recording, the new bounds apply from the next eviction pass;
    /// the tick interval of the running session is kept until the next
    /// [`Sampler::enable`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] if `config` is invalid.
    pub fn set_config(&mut self, config: RetentionConfig) -> Result<()> {
        config.validate()?;
        self.store.set_config(config);
        if let Some(running) = &mut self.running {
            running.session.config = config;
        }
        Ok(())
    }

    /// The running session, if recording.
    pub fn session(&self) -> Option<&RecordingSession> {
        self.running.as_ref().map(|r| &r.session)
    }

    /// Whether recording is running.
    pub fn is_enabled(&self) -> bool {
        self.running.is_some()
    }

    /// Counters of the current (or last) session.
    pub fn stats(&self) -> SamplerStats {
        self.counters.snapshot()
    }

    /// The store this sampler writes to.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("clock", &self.clock)
            .field("read_timeout", &self.read_timeout)
            .field("session", &self.session())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            tracing::warn!(error = %e, "failed to save snapshot on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ManualClock, secs};
    use crate::source::FnSource;
    use crate::store::Store;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_ticker_is_drift_free() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        for n in 1..=10u32 {
            let due = ticker.next_due();
            assert_eq!(due, Duration::from_secs(u64::from(n)));
            // each tick does 50ms of work
            assert_eq!(ticker.complete(due + ms(50)), 0);
        }
        assert_eq!(ticker.next_due(), Duration::from_secs(11));
    }

    #[test]
    fn test_ticker_coalesces_overrun_into_one_tick() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        // tick 1 runs until 3.5s: deadline 2 is skipped, deadline 3 fires now
        assert_eq!(ticker.complete(ms(3500)), 1);
        assert_eq!(ticker.next_index(), 3);
        assert_eq!(ticker.next_due(), Duration::from_secs(3));

        // back on the grid afterwards
        assert_eq!(ticker.complete(ms(3600)), 0);
        assert_eq!(ticker.next_due(), Duration::from_secs(4));
    }

    #[test]
    fn test_ticker_overrun_to_exact_deadline() {
        let mut ticker = Ticker::new(Duration::from_secs(1));
        assert_eq!(ticker.complete(Duration::from_secs(2)), 0);
        assert_eq!(ticker.next_due(), Duration::from_secs(2));
    }

    #[test]
    fn test_reader_timeout_then_busy() {
        let source = Arc::new(FnSource::new(|| {
            thread::sleep(ms(200));
            Ok(Readings::new())
        }));
        let mut reader = Reader::spawn(source).unwrap();

        assert_eq!(reader.read(ms(10)), Err(SourceError::Timeout { after: ms(10) }));
        assert_eq!(reader.read(ms(10)), Err(SourceError::Busy));

        thread::sleep(ms(300));
        // stale answer discarded, fresh read issued (and times out again)
        assert_eq!(reader.read(ms(10)), Err(SourceError::Timeout { after: ms(10) }));
    }

    #[test]
    fn test_reader_catches_panics() {
        let source = Arc::new(FnSource::new(|| -> ReadResult { panic!("sensor exploded") }));
        let mut reader = Reader::spawn(source).unwrap();
        assert_eq!(
            reader.read(Duration::from_secs(5)),
            Err(SourceError::Panicked {
                message: "sensor exploded".to_string()
            })
        );
        // the reader thread survives
        assert!(matches!(
            reader.read(Duration::from_secs(5)),
            Err(SourceError::Panicked { .. })
        ));
    }

    #[test]
    fn test_enable_rejects_invalid_config_and_double_enable() {
        let config = RetentionConfig::new(ms(10), Duration::from_secs(60), 10_000).unwrap();
        let store = SharedStore::new(Store::new(config));
        let source = Arc::new(FnSource::new(|| Ok(Readings::new())));
        let mut sampler = Sampler::new(store, source);

        let bad = RetentionConfig {
            interval: Duration::ZERO,
            ..config
        };
        assert!(sampler.enable(bad, SensorSelection::All).is_err());
        assert!(!sampler.is_enabled());

        sampler.enable(config, SensorSelection::All).unwrap();
        assert!(matches!(
            sampler.enable(config, SensorSelection::All),
            Err(crate::RetraceError::Sampler(SamplerError::AlreadyEnabled))
        ));

        sampler.disable().unwrap();
        sampler.disable().unwrap();
        assert!(!sampler.is_enabled());
    }

    fn idle_driver(
        store: SharedStore,
        counters: Arc<Counters>,
        control: Receiver<Command>,
    ) -> Driver {
        let source = Arc::new(FnSource::new(|| {
            Ok(Readings::from([("cpu".to_string(), Some(1.0))]))
        }));
        Driver {
            store,
            reader: Reader::spawn(source).unwrap(),
            clock: Arc::new(ManualClock::new(secs(1))),
            counters,
            interval: ms(1),
            read_timeout: ms(100),
            selection: SensorSelection::All,
            control,
        }
    }

    #[test]
    fn test_driver_waits_for_start() {
        let config = RetentionConfig::new(ms(1), Duration::from_secs(60), 10_000).unwrap();
        let store = SharedStore::new(Store::new(config));
        let counters = Arc::new(Counters::default());
        let (control_tx, control_rx) = mpsc::channel();

        let driver = idle_driver(store.clone(), Arc::clone(&counters), control_rx);
        let handle = thread::spawn(move || driver.run());
        thread::sleep(ms(30));
        drop(control_tx);
        handle.join().unwrap();

        assert_eq!(counters.snapshot(), SamplerStats::default());
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_failed_enable_keeps_previous_session_state() {
        let config = RetentionConfig::new(ms(10), Duration::from_secs(60), 10_000).unwrap();
        let store = SharedStore::new(Store::new(config));
        let source = Arc::new(FnSource::new(|| {
            Ok(Readings::from([("cpu".to_string(), Some(1.0))]))
        }));
        let mut sampler = Sampler::new(store.clone(), source);

        sampler.enable(config, SensorSelection::All).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sampler.stats().appended < 2 && Instant::now() < deadline {
            thread::sleep(ms(5));
        }
        sampler.disable().unwrap();
        let before = sampler.stats();
        assert!(before.appended >= 2);

        let bad = RetentionConfig {
            max_bytes: 0,
            ..config
        };
        assert!(sampler.enable(bad, SensorSelection::All).is_err());
        assert_eq!(sampler.stats(), before);
        assert_eq!(store.read().config(), &config);
    }

    #[test]
    fn test_missing_and_none_readings_count_as_unavailable() {
        let config = RetentionConfig::new(ms(10), Duration::from_secs(60), 10_000).unwrap();
        let store = SharedStore::new(Store::new(config));
        let counters = Arc::new(Counters::default());
        let (_control_tx, control_rx) = mpsc::channel();

        let source = Arc::new(FnSource::new(|| {
            Ok(Readings::from([
                ("cpu".to_string(), Some(1.0)),
                ("gpu".to_string(), None),
                ("fan".to_string(), Some(3.0)),
            ]))
        }));
        let mut driver = Driver {
            store: store.clone(),
            reader: Reader::spawn(source).unwrap(),
            clock: Arc::new(ManualClock::new(secs(1))),
            counters: Arc::clone(&counters),
            interval: ms(10),
            read_timeout: Duration::from_secs(5),
            selection: SensorSelection::only(["cpu", "gpu", "disk"]),
            control: control_rx,
        };

        driver.tick(1);

        let stats = counters.snapshot();
        // gpu reported None, disk was not reported at all, fan is not selected
        assert_eq!(stats.unavailable, 2);
        assert_eq!(stats.appended, 1);
        assert_eq!(stats.read_failures, 0);
        assert_eq!(store.read().sensor_ids().collect::<Vec<_>>(), vec!["cpu"]);
    }

    #[test]
    fn test_read_timeout_clamped_to_interval() {
        let config = RetentionConfig::new(ms(20), Duration::from_secs(60), 10_000).unwrap();
        let store = SharedStore::new(Store::new(config));
        let source = Arc::new(FnSource::new(|| Ok(Readings::new())));
        let mut sampler = Sampler::new(store, source)
            .with_clock(Arc::new(ManualClock::new(0)))
            .with_read_timeout(Duration::from_secs(5));

        sampler.enable(config, SensorSelection::All).unwrap();
        assert_eq!(sampler.session().unwrap().read_timeout, ms(20));
        sampler.disable().unwrap();
    }
}
