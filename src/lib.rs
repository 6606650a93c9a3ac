//! Camera-trap sensing core.
//!
//! This crate decides which captured frames are worth keeping and correlates
//! asynchronous environmental sensor readings with those frames by time.
//!
//! # Architecture
//!
//! Two long-lived workers run beside the owner's main flow of control:
//!
//! 1. **Sensor logs** (`sensor::SensorLogs`): samples the sensor board on a fixed
//!    period and answers "closest reading to time T" queries, pruning older logs.
//! 2. **Frame dispatcher** (`filter::FrameDispatcher`): pulls frames from the camera,
//!    scores them for motion and forwards motion segments to the segment sink.
//!
//! Neither worker shares memory with its callers; all interaction is message passing.
//!
//! # Module Structure
//!
//! - `sensor`: Sensor board protocol, serial adapter and the correlation store
//! - `ingest`: Frame sources (queue-fed, synthetic)
//! - `detect`: Motion-score and animal-classifier contracts with stub backends
//! - `filter`: Frame dispatcher, motion queue and the `Filter` facade
//! - `config`: `trapd` configuration

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod sensor;

pub use detect::{AnimalClassifier, MotionScorer, StubClassifier, StubScorer};
pub use filter::{Filter, FilterSettings, FrameDispatcher, MotionQueue, SegmentSink, SegmentState};
pub use frame::Frame;
pub use ingest::{ChannelSource, FrameSource, SyntheticConfig, SyntheticSource};
pub use sensor::{
    parse_ursense, LogStore, ParseOutcome, Reading, Sensor, SensorLog, SensorLogs,
    SensorSettings, UnsupportedMode,
};

/// Current wall-clock time as a UNIX timestamp in fractional seconds.
///
/// Falls back to `0.0` if the system clock reads before the epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
