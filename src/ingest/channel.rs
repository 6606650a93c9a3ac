//! Queue-fed frame source.
//!
//! A camera driver (or a test) pushes frames into the sender half; the
//! dispatcher pulls from `ChannelSource`. A pull that waits longer than the
//! configured timeout is an input fault.

use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct ChannelSource {
    frames: Receiver<Frame>,
    framerate: u32,
    timeout: Duration,
    stats: SourceStats,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(framerate: u32, timeout: Duration) -> (Sender<Frame>, Self) {
        let (tx, rx) = channel::unbounded();
        (tx, Self::from_receiver(rx, framerate, timeout))
    }

    pub fn from_receiver(frames: Receiver<Frame>, framerate: u32, timeout: Duration) -> Self {
        Self {
            frames,
            framerate,
            timeout,
            stats: SourceStats::default(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl FrameSource for ChannelSource {
    fn framerate(&self) -> u32 {
        self.framerate
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match self.frames.recv_timeout(self.timeout) {
            Ok(frame) => {
                self.stats.frames_captured += 1;
                Ok(frame)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.stats.faults += 1;
                Err(anyhow!("no frame within {:?}", self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Keep the pull bounded even with no producer left.
                std::thread::sleep(self.timeout);
                self.stats.faults += 1;
                Err(anyhow!("frame producer disconnected"))
            }
        }
    }
}
