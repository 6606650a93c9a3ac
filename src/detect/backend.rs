use anyhow::Result;

use crate::detect::result::Classification;

/// Motion-score stage.
///
/// Scorers are stateful across calls (e.g. a sliding window over recent
/// frames); `reset` clears that state. The filter compares each score against
/// its SotV threshold.
pub trait MotionScorer: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Score one frame's motion input.
    fn score(&mut self, motion: &[u8]) -> f64;

    /// Forget all history, as after a gap in the frame stream.
    fn reset(&mut self);
}

/// Animal-presence classifier.
///
/// Implementations must treat the image as read-only and must not keep it
/// beyond the `classify` call.
pub trait AnimalClassifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one image.
    fn classify(&mut self, image: &[u8]) -> Result<Classification>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
