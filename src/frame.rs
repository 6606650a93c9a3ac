//! Camera frames.
//!
//! A `Frame` is produced by a frame source, consumed exactly once by the frame
//! dispatcher, and either forwarded to the motion queue or dropped. The core
//! never retains a frame beyond the forwarding call, so `Frame` is deliberately
//! not `Clone`.

use std::fmt;

/// One captured frame.
pub struct Frame {
    /// Encoded image (opaque to this crate).
    pub image: Vec<u8>,
    /// Motion input for the motion-score stage, e.g. per-macroblock vector magnitudes.
    pub motion: Vec<u8>,
    /// Position of the frame in the camera's output stream.
    pub index: u64,
    /// Capture time as a UNIX timestamp; used to look up sensor logs.
    pub timestamp: f64,
}

impl Frame {
    /// Create a frame stamped with the current time.
    pub fn new(image: Vec<u8>, motion: Vec<u8>, index: u64) -> Self {
        Self::captured_at(image, motion, index, crate::unix_now())
    }

    pub fn captured_at(image: Vec<u8>, motion: Vec<u8>, index: u64, timestamp: f64) -> Self {
        Self {
            image,
            motion,
            index,
            timestamp,
        }
    }
}

// Image bytes are never written to logs.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("image_bytes", &self.image.len())
            .field("motion_bytes", &self.motion.len())
            .finish()
    }
}
