//! Frame ingestion sources.
//!
//! This module provides the camera side of the filter pipeline:
//! - `ChannelSource`: frames pushed by a camera driver through a queue
//! - `SyntheticSource`: generated frames with periodic "visits" (testing, demo)
//!
//! All sources produce `Frame` instances that flow into the frame dispatcher.
//! A pull either yields the next frame or fails with an input fault. Faults are
//! expected (a camera hiccup, an empty queue) and never end the pipeline, so
//! sources must bound how long a pull may block.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub mod channel;
pub mod synthetic;

pub use channel::ChannelSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Camera collaborator of the frame dispatcher.
pub trait FrameSource: Send {
    /// Configured frames per second; the motion stage is initialised from it.
    fn framerate(&self) -> u32;

    /// Pull the next frame. An error is an input fault, not a fatal condition.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub faults: u64,
}

/// Open the camera named by `url`.
///
/// Only `stub://` sources are built in; camera drivers feed a `ChannelSource`.
pub fn open_source(
    url: &str,
    framerate: u32,
    width: u32,
    height: u32,
) -> Result<Box<dyn FrameSource>> {
    if url.starts_with("stub://") {
        let config = SyntheticConfig {
            url: url.to_string(),
            framerate,
            width,
            height,
            ..SyntheticConfig::default()
        };
        return Ok(Box::new(SyntheticSource::new(config)?));
    }
    Err(anyhow!("unsupported camera source '{}' (expected stub://)", url))
}
