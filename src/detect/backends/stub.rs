use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::{AnimalClassifier, MotionScorer};
use crate::detect::result::Classification;

/// Stub motion scorer for testing.
///
/// Sums the motion magnitudes of each frame and averages the sums over a
/// sliding window of recent frames.
pub struct StubScorer {
    window: VecDeque<u64>,
    window_len: usize,
}

impl StubScorer {
    pub fn new(window_len: usize) -> Self {
        let window_len = window_len.max(1);
        Self {
            window: VecDeque::with_capacity(window_len),
            window_len,
        }
    }

    /// Window of a quarter second at `framerate`.
    pub fn for_framerate(framerate: u32) -> Self {
        Self::new((framerate / 4) as usize)
    }
}

impl Default for StubScorer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MotionScorer for StubScorer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn score(&mut self, motion: &[u8]) -> f64 {
        let sum: u64 = motion.iter().map(|&m| m as u64).sum();
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(sum);
        self.window.iter().sum::<u64>() as f64 / self.window.len() as f64
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Stub classifier for testing.
///
/// Confidence is the share of bright bytes in the image.
pub struct StubClassifier {
    threshold: f32,
}

impl StubClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl AnimalClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, image: &[u8]) -> Result<Classification> {
        if image.is_empty() {
            return Ok(Classification::default());
        }
        let bright = image.iter().filter(|&&b| b >= 128).count();
        let confidence = bright as f32 / image.len() as f32;
        Ok(Classification::from_confidence(confidence, self.threshold))
    }
}
