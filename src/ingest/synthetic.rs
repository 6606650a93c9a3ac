//! Synthetic frame source.
//!
//! Generates a static background scene with periodic "visits": short runs of
//! frames with strong motion in one corner and a bright subject in the image.
//! Used by the `trapd` daemon for `stub://` cameras and by pipeline tests.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Motion vectors are reported per 16x16 macroblock.
const MACROBLOCK: u32 = 16;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
    /// A visit starts every `visit_every` frames (0 disables visits).
    pub visit_every: u64,
    /// Length of each visit in frames.
    pub visit_frames: u64,
    /// Sleep between frames to hold `framerate`.
    pub paced: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            framerate: 20,
            width: 640,
            height: 480,
            visit_every: 100,
            visit_frames: 20,
            paced: true,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    /// Simulated scene drift so consecutive backgrounds differ slightly.
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.framerate == 0 {
            return Err(anyhow!("synthetic source framerate must be greater than zero"));
        }
        if config.width < MACROBLOCK || config.height < MACROBLOCK {
            return Err(anyhow!(
                "synthetic frames must be at least {}x{}",
                MACROBLOCK,
                MACROBLOCK
            ));
        }
        log::info!("SyntheticSource: connected to {}", config.url);
        Ok(Self {
            config,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        })
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            faults: 0,
        }
    }

    /// Whether frame number `n` (0-based) falls inside a visit.
    pub fn is_visit_frame(&self, n: u64) -> bool {
        let every = self.config.visit_every;
        if every == 0 {
            return false;
        }
        n % every >= every - self.config.visit_frames.min(every)
    }

    fn pace(&mut self) {
        let period = Duration::from_secs_f64(1.0 / self.config.framerate as f64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_motion(&self, visit: bool) -> Vec<u8> {
        let cols = self.config.width / MACROBLOCK;
        let rows = self.config.height / MACROBLOCK;
        let mut rng = rand::thread_rng();
        let mut motion = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                let in_subject = visit && row < rows / 2 && col < cols / 2;
                motion.push(if in_subject {
                    rng.gen_range(150..=255)
                } else {
                    rng.gen_range(0..4)
                });
            }
        }
        motion
    }

    fn generate_image(&mut self, visit: bool) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.config.width * self.config.height) as usize;
        let base: u64 = if visit { 128 } else { 0 };
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = (base + (i as u64 + self.frame_count + self.scene_state as u64) % 64) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn framerate(&self) -> u32 {
        self.config.framerate
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.config.paced {
            self.pace();
        }
        let index = self.frame_count;
        let visit = self.is_visit_frame(index);
        let motion = self.generate_motion(visit);
        let image = self.generate_image(visit);
        self.frame_count += 1;
        Ok(Frame::new(image, motion, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpaced(visit_every: u64, visit_frames: u64) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 64,
            height: 48,
            visit_every,
            visit_frames,
            paced: false,
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn visits_close_each_period() {
        let source = unpaced(10, 3);
        let visits: Vec<u64> = (0..20).filter(|&n| source.is_visit_frame(n)).collect();
        assert_eq!(visits, vec![7, 8, 9, 17, 18, 19]);
    }

    #[test]
    fn visit_frames_carry_strong_motion() {
        let mut source = unpaced(4, 2);
        let quiet = source.next_frame().unwrap();
        source.next_frame().unwrap();
        let busy = source.next_frame().unwrap();

        let sum = |m: &[u8]| m.iter().map(|&b| b as u64).sum::<u64>();
        assert_eq!(quiet.motion.len(), 4 * 3);
        assert!(sum(&quiet.motion) < 4 * 12);
        assert!(sum(&busy.motion) >= 150 * 2);
        assert!(busy.image.iter().all(|&p| p >= 128));
        assert!(quiet.image.iter().all(|&p| p < 64));
    }

    #[test]
    fn indices_increase() {
        let mut source = unpaced(0, 0);
        for expected in 0..5 {
            assert_eq!(source.next_frame().unwrap().index, expected);
        }
        assert_eq!(source.stats().frames_captured, 5);
    }

    #[test]
    fn rejects_zero_framerate() {
        let config = SyntheticConfig {
            framerate: 0,
            ..SyntheticConfig::default()
        };
        assert!(SyntheticSource::new(config).is_err());
    }
}
