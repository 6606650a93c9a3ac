//! trapd - camera trap daemon
//!
//! This daemon:
//! 1. Starts the sensor logger (degrades to timestamp-only logs without a board)
//! 2. Starts the filter pipeline on the configured camera
//! 3. For every animal frame, looks up the sensor log closest to its capture time
//! 4. Logs the pairing until Ctrl-C or the configured run time elapses

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use trapwatch::config::TrapConfig;
use trapwatch::ingest::open_source;
use trapwatch::{Filter, SensorLogs, StubClassifier, StubScorer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "TRAP_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many seconds (runs until Ctrl-C otherwise).
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = TrapConfig::load_from(args.config.as_deref())?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))?;

    let sensor_logs = SensorLogs::new(&cfg.sensor)?;
    log::info!(
        "sensor logs on {} (baud {}), every {:?}",
        cfg.sensor.port,
        cfg.sensor.baud,
        sensor_logs.read_interval()
    );

    let source = open_source(
        &cfg.camera.source,
        cfg.camera.framerate,
        cfg.camera.width,
        cfg.camera.height,
    )?;
    let scorer = StubScorer::for_framerate(source.framerate());
    let filter = Filter::new(
        source,
        &cfg.filter,
        Box::new(scorer),
        Box::new(StubClassifier::new(cfg.animal_threshold)),
    )?;
    log::info!(
        "trapd running: camera={} fps={} sotv_threshold={}",
        cfg.camera.source,
        filter.framerate(),
        cfg.filter.sotv_threshold
    );

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let mut animal_frames = 0u64;

    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        let Some(frame) = filter.get_timeout(Duration::from_millis(250))? else {
            continue;
        };
        animal_frames += 1;

        match sensor_logs.get(frame.timestamp)? {
            Some(reading) => log::info!(
                "animal frame #{} (index {}) t={:.3} sensor={}",
                animal_frames,
                frame.index,
                frame.timestamp,
                serde_json::to_string(&reading)?
            ),
            None => log::info!(
                "animal frame #{} (index {}) t={:.3} (no sensor log)",
                animal_frames,
                frame.index,
                frame.timestamp
            ),
        }
    }

    log::info!("trapd stopping after {} animal frames", animal_frames);
    filter.close();
    sensor_logs.close();
    Ok(())
}
