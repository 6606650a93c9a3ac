//! Environmental sensor board support.
//!
//! - `protocol`: parses one line of urSense board output into a `SensorLog`
//! - `adapter`: owns the serial channel and returns the latest reading
//! - `store`: keeps logs keyed by observation time and serves nearest-time queries
//!
//! The device must keep operating without sensor hardware. Missing hardware and
//! malformed board output degrade to timestamp-only logs; only an unsupported
//! report mode surfaces as a hard failure.

use serde::Serialize;

pub mod adapter;
pub mod protocol;
pub mod store;

pub use adapter::{Sensor, SensorChannel};
pub use protocol::{parse_ursense, ParseOutcome, UnsupportedMode};
pub use store::{find_closest_key, LogSampler, LogStore, SensorLogs, SensorSettings};

/// A single sensor reading: a value and its unit of measurement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    pub value: f64,
    pub units: String,
}

impl Reading {
    pub fn new(value: f64, units: impl Into<String>) -> Self {
        Self {
            value,
            units: units.into(),
        }
    }
}

/// Readings taken at one moment in time.
///
/// `system_time` is the UNIX timestamp at which the observing side captured the
/// log, never the board's own clock. Fields the board did not report for the
/// active mode are `None`, not zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SensorLog {
    pub system_time: f64,
    pub ursense_id: Option<String>,
    pub brightness: Option<Reading>,
    pub humidity: Option<Reading>,
    pub pressure: Option<Reading>,
    pub temperature_skwt: Option<Reading>,
    pub temperature_prst: Option<Reading>,
    pub air_quality: Option<Reading>,
    pub gps_time: Option<String>,
    pub gps_location: Option<String>,
    pub altitude: Option<Reading>,
    pub sun_azimuth: Option<Reading>,
    pub sun_altitude: Option<Reading>,
}

impl SensorLog {
    /// A log carrying only the observation time.
    pub fn empty_at(system_time: f64) -> Self {
        Self {
            system_time,
            ..Self::default()
        }
    }

    /// True when the log holds no readings at all.
    pub fn is_empty(&self) -> bool {
        self.ursense_id.is_none()
            && self.brightness.is_none()
            && self.humidity.is_none()
            && self.pressure.is_none()
            && self.temperature_skwt.is_none()
            && self.temperature_prst.is_none()
            && self.air_quality.is_none()
            && self.gps_time.is_none()
            && self.gps_location.is_none()
            && self.altitude.is_none()
            && self.sun_azimuth.is_none()
            && self.sun_altitude.is_none()
    }
}
