use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::filter::{FilterSettings, MotionQueueSettings};
use crate::sensor::SensorSettings;

const DEFAULT_SENSOR_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_SENSOR_BAUD: u32 = 57600;
const DEFAULT_SENSOR_INTERVAL_S: f64 = 30.0;
const DEFAULT_CAMERA_SOURCE: &str = "stub://camera";
const DEFAULT_FRAMERATE: u32 = 20;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SOTV_THRESHOLD: f64 = 5000.0;
const DEFAULT_ANIMAL_THRESHOLD: f32 = 0.8;

#[derive(Debug, Deserialize, Default)]
struct TrapConfigFile {
    sensor: Option<SensorConfigFile>,
    camera: Option<CameraConfigFile>,
    filter: Option<FilterConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SensorConfigFile {
    port: Option<String>,
    baud: Option<u32>,
    interval_s: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    framerate: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    motion: Option<MotionConfigFile>,
    motion_queue: Option<MotionQueueConfigFile>,
    animal: Option<AnimalConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    sotv_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionQueueConfigFile {
    max_segment_frames: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AnimalConfigFile {
    threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct TrapConfig {
    pub sensor: SensorSettings,
    pub camera: CameraSettings,
    pub filter: FilterSettings,
    /// Confidence at which the classifier accepts a frame as an animal.
    pub animal_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub source: String,
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
}

impl TrapConfig {
    /// Load from the file named by `TRAP_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAP_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from `path` (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrapConfigFile) -> Result<Self> {
        let sensor_file = file.sensor.unwrap_or_default();
        let interval_s = sensor_file.interval_s.unwrap_or(DEFAULT_SENSOR_INTERVAL_S);
        let sensor = SensorSettings {
            port: sensor_file
                .port
                .unwrap_or_else(|| DEFAULT_SENSOR_PORT.to_string()),
            baud: sensor_file.baud.unwrap_or(DEFAULT_SENSOR_BAUD),
            interval: interval_from_secs(interval_s)?,
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            source: camera_file
                .source
                .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
            framerate: camera_file.framerate.unwrap_or(DEFAULT_FRAMERATE),
            width: camera_file.width.unwrap_or(DEFAULT_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_HEIGHT),
        };

        let filter_file = file.filter.unwrap_or_default();
        let filter = FilterSettings {
            sotv_threshold: filter_file
                .motion
                .and_then(|motion| motion.sotv_threshold)
                .unwrap_or(DEFAULT_SOTV_THRESHOLD),
            motion_queue: MotionQueueSettings {
                max_segment_frames: filter_file
                    .motion_queue
                    .and_then(|queue| queue.max_segment_frames)
                    .unwrap_or(0),
            },
        };
        let animal_threshold = filter_file
            .animal
            .and_then(|animal| animal.threshold)
            .unwrap_or(DEFAULT_ANIMAL_THRESHOLD);

        Ok(Self {
            sensor,
            camera,
            filter,
            animal_threshold,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("TRAP_SENSOR_PORT") {
            if !port.trim().is_empty() {
                self.sensor.port = port;
            }
        }
        if let Ok(baud) = std::env::var("TRAP_SENSOR_BAUD") {
            self.sensor.baud = baud
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAP_SENSOR_BAUD must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("TRAP_SENSOR_INTERVAL_S") {
            let seconds: f64 = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAP_SENSOR_INTERVAL_S must be a number of seconds"))?;
            self.sensor.interval = interval_from_secs(seconds)?;
        }
        if let Ok(source) = std::env::var("TRAP_CAMERA_SOURCE") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Ok(framerate) = std::env::var("TRAP_FRAMERATE") {
            self.camera.framerate = framerate
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAP_FRAMERATE must be an integer"))?;
        }
        if let Ok(threshold) = std::env::var("TRAP_SOTV_THRESHOLD") {
            self.filter.sotv_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAP_SOTV_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sensor.interval.is_zero() {
            return Err(anyhow!("sensor interval must be greater than zero"));
        }
        if self.sensor.baud == 0 {
            return Err(anyhow!("sensor baud must be greater than zero"));
        }
        if self.camera.framerate == 0 {
            return Err(anyhow!("camera framerate must be greater than zero"));
        }
        if !self.filter.sotv_threshold.is_finite() {
            return Err(anyhow!("sotv_threshold must be a finite number"));
        }
        if !(0.0..=1.0).contains(&self.animal_threshold) {
            return Err(anyhow!("animal threshold must be within 0..=1"));
        }
        Ok(())
    }
}

fn interval_from_secs(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(anyhow!("sensor interval must be greater than zero"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| anyhow!("sensor interval is out of range"))
}

fn read_config_file(path: &Path) -> Result<TrapConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
