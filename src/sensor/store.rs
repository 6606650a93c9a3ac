//! Sensor log store with nearest-timestamp lookup.
//!
//! `LogStore` holds every log sampled so far, ordered by observation time.
//! `SensorLogs` runs a `LogStore` on a dedicated worker thread that:
//! - Samples the sensor on a fixed period
//! - Serves "closest log to time T" queries from a single caller
//!
//! Sampling and query serving share one thread and are selected between, so a
//! query never runs while a sample is being inserted.
//!
//! Queries are expected in non-decreasing time order (one per frame). A query
//! prunes every log older than its match, which bounds memory to the window
//! since the previous query.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver, Sender};

use super::{Sensor, SensorLog, UnsupportedMode};

/// Delay before the first sample after the worker starts.
pub const FIRST_SAMPLE_DELAY: Duration = Duration::from_millis(100);

/// Settings for the sensor logger.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorSettings {
    /// Serial port of the board, e.g. `/dev/ttyUSB0`.
    pub port: String,
    pub baud: u32,
    /// Sampling period.
    pub interval: Duration,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 57600,
            interval: Duration::from_secs(30),
        }
    }
}

/// Source of sensor logs for the store.
pub trait LogSampler: Send {
    /// False when no hardware was found; the store then never samples.
    fn is_available(&self) -> bool;

    /// Take one log. Only unrecoverable conditions are errors.
    fn sample(&mut self) -> Result<SensorLog>;
}

impl LogSampler for Sensor {
    fn is_available(&self) -> bool {
        self.is_connected()
    }

    fn sample(&mut self) -> Result<SensorLog> {
        self.read()
    }
}

/// Index of the key closest to `target` in an ascending, unique key slice.
///
/// Bisects down to a window of one or two keys. With two keys left, a target
/// at or past their mean picks the later key, so exact ties go to the later
/// key. Returns `None` only for an empty slice.
pub fn find_closest_key(keys: &[f64], target: f64) -> Option<usize> {
    let mut lo = 0;
    let mut hi = keys.len();
    loop {
        match hi - lo {
            0 => return None,
            1 => return Some(lo),
            2 => {
                let mean = (keys[lo] + keys[lo + 1]) / 2.0;
                return Some(if target >= mean { lo + 1 } else { lo });
            }
            len => {
                let mid = lo + len / 2;
                if target == keys[mid] {
                    return Some(mid);
                } else if target > keys[mid] {
                    lo = mid;
                } else {
                    hi = mid + 1;
                }
            }
        }
    }
}

/// Logs keyed by `system_time`, strictly increasing front to back.
pub struct LogStore {
    sampler: Box<dyn LogSampler>,
    available: bool,
    logs: VecDeque<SensorLog>,
}

impl LogStore {
    pub fn new(sampler: Box<dyn LogSampler>) -> Self {
        let available = sampler.is_available();
        Self {
            sampler,
            available,
            logs: VecDeque::new(),
        }
    }

    /// Whether the sampler had hardware when the store was created.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Stored keys, oldest first.
    pub fn keys(&self) -> Vec<f64> {
        self.logs.iter().map(|log| log.system_time).collect()
    }

    /// The log stored at exactly `timestamp`.
    pub fn get(&self, timestamp: f64) -> Option<&SensorLog> {
        self.position(timestamp).map(|i| &self.logs[i])
    }

    /// Take one sample and store it. A no-op when no hardware is available.
    pub fn log_now(&mut self) -> Result<()> {
        if !self.available {
            return Ok(());
        }
        let log = self.sampler.sample()?;
        log::debug!("{:?}", log);
        self.insert(log);
        Ok(())
    }

    /// Store a log. Returns false if its key does not advance past the newest key.
    pub fn insert(&mut self, log: SensorLog) -> bool {
        if let Some(newest) = self.logs.back() {
            if log.system_time <= newest.system_time {
                log::warn!(
                    "Dropping sensor log at {} (not after newest log at {})",
                    log.system_time,
                    newest.system_time
                );
                return false;
            }
        }
        self.logs.push_back(log);
        true
    }

    /// Remove the logs with exactly these keys.
    ///
    /// Every present key is removed; fails afterwards if any key was missing.
    pub fn remove_logs(&mut self, timestamps: &[f64]) -> Result<()> {
        let mut missing = Vec::new();
        for &t in timestamps {
            match self.position(t) {
                Some(i) => {
                    self.logs.remove(i);
                }
                None => missing.push(t),
            }
        }

        if !timestamps.is_empty() {
            log::debug!(
                "Deleted logs for {:?}, {} remaining",
                timestamps,
                self.logs.len()
            );
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("no sensor log stored at {:?}", missing))
        }
    }

    /// Find the log closest to `timestamp` and prune every older log.
    ///
    /// The matched log and all later logs are kept; later frames may still
    /// match them.
    pub fn lookup(&mut self, timestamp: f64) -> Option<SensorLog> {
        if !self.available {
            return None;
        }

        let keys = self.keys();
        let index = find_closest_key(&keys, timestamp)?;

        if let Err(e) = self.remove_logs(&keys[..index]) {
            log::error!("Attempted to delete nonexistent log(s): {}", e);
        }
        self.get(keys[index]).cloned()
    }

    fn position(&self, timestamp: f64) -> Option<usize> {
        self.logs
            .binary_search_by(|log| log.system_time.total_cmp(&timestamp))
            .ok()
    }
}

/// Request/response channel pair held by the caller side.
struct QueryChannels {
    requests: Sender<f64>,
    responses: Receiver<Option<SensorLog>>,
}

/// Sensor log store running on its own worker thread.
pub struct SensorLogs {
    channels: Mutex<QueryChannels>,
    stop: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    failure: Arc<OnceLock<String>>,
    read_interval: Duration,
}

impl SensorLogs {
    /// Open the sensor board and start sampling.
    ///
    /// A missing board is not an error: the store starts and every `get`
    /// returns `None`.
    pub fn new(settings: &SensorSettings) -> Result<Self> {
        let sensor = Sensor::open(&settings.port, settings.baud);
        Self::with_sampler(Box::new(sensor), settings.interval)
    }

    /// Start a store that samples `sampler` every `interval`.
    pub fn with_sampler(sampler: Box<dyn LogSampler>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(anyhow!("sensor read interval must be greater than zero"));
        }

        let (request_tx, request_rx) = channel::unbounded();
        let (response_tx, response_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded(1);
        let failure = Arc::new(OnceLock::new());

        let store = LogStore::new(sampler);
        let worker_failure = failure.clone();
        let worker = thread::Builder::new()
            .name("sensor-logs".to_string())
            .spawn(move || {
                // Channels must drop after the failure is recorded.
                if let Err(e) = run_worker(store, interval, &request_rx, &response_tx, &stop_rx) {
                    log::error!("sensor log worker stopped: {}", e);
                    let _ = worker_failure.set(e.to_string());
                }
            })?;
        log::debug!("SensorLogs started");

        Ok(Self {
            channels: Mutex::new(QueryChannels {
                requests: request_tx,
                responses: response_rx,
            }),
            stop: stop_tx,
            worker: Mutex::new(Some(worker)),
            failure,
            read_interval: interval,
        })
    }

    pub fn read_interval(&self) -> Duration {
        self.read_interval
    }

    /// Get the log closest to `timestamp`, deleting older logs.
    ///
    /// Returns `None` when nothing has been logged or no board was found.
    /// Fails once the worker has stopped.
    pub fn get(&self, timestamp: f64) -> Result<Option<SensorLog>> {
        let channels = self
            .channels
            .lock()
            .map_err(|_| anyhow!("sensor log query lock poisoned"))?;
        channels
            .requests
            .send(timestamp)
            .map_err(|_| self.stopped())?;
        channels.responses.recv().map_err(|_| self.stopped())
    }

    /// Stop the worker and wait for it. Buffered logs are discarded.
    pub fn close(&self) {
        let _ = self.stop.try_send(());
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("sensor log worker panicked");
            }
            log::debug!("SensorLogs closed");
        }
    }

    fn stopped(&self) -> anyhow::Error {
        match self.failure.get() {
            Some(reason) => anyhow!("sensor log worker stopped: {}", reason),
            None => anyhow!("sensor log worker stopped"),
        }
    }
}

impl Drop for SensorLogs {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mut store: LogStore,
    interval: Duration,
    requests: &Receiver<f64>,
    responses: &Sender<Option<SensorLog>>,
    stop: &Receiver<()>,
) -> Result<()> {
    let first_sample = channel::after(FIRST_SAMPLE_DELAY);
    let ticker = channel::tick(interval);

    loop {
        crossbeam::select! {
            recv(stop) -> _ => return Ok(()),
            recv(first_sample) -> _ => sample(&mut store)?,
            recv(ticker) -> _ => sample(&mut store)?,
            recv(requests) -> request => {
                let Ok(timestamp) = request else {
                    return Ok(());
                };
                if responses.send(store.lookup(timestamp)).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// One sampling tick. Only an unsupported report mode escapes.
fn sample(store: &mut LogStore) -> Result<()> {
    match store.log_now() {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<UnsupportedMode>().is_some() => Err(e),
        Err(e) => {
            log::warn!("sensor sample failed: {}", e);
            Ok(())
        }
    }
}
