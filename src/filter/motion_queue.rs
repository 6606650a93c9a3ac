//! Motion segment sink.
//!
//! The frame dispatcher pushes every motion frame into a `SegmentSink` and
//! signals the end of each motion sequence. `MotionQueue` is the reference
//! sink: it buffers the open segment, runs the animal classifier over it when
//! the segment closes, and publishes accepted frames on an output channel.
//!
//! Segment state is an explicit two-state machine owned by the sink:
//!
//! ```text
//!   Closed --put--> Open --put--> Open
//!   Open --end_motion_sequence--> Closed
//!   Closed --end_motion_sequence--> Closed   (no-op)
//! ```

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver, Sender};

use crate::detect::AnimalClassifier;
use crate::frame::Frame;

/// Downstream stage fed by the frame dispatcher.
pub trait SegmentSink: Send {
    /// Add a motion frame, opening a segment if none is open.
    fn put(&mut self, frame: Frame, score: f64) -> Result<()>;

    /// Close the open segment. Must be a no-op when no segment is open.
    fn end_motion_sequence(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentState {
    #[default]
    Closed,
    Open,
}

/// Settings for the motion queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionQueueSettings {
    /// Classify and flush a segment once it holds this many frames (0 = unbounded).
    pub max_segment_frames: usize,
}

/// Buffers motion segments and forwards the frames the classifier accepts.
pub struct MotionQueue {
    classifier: Box<dyn AnimalClassifier>,
    settings: MotionQueueSettings,
    state: SegmentState,
    segment: Vec<(Frame, f64)>,
    output: Sender<Frame>,
    segments_closed: u64,
}

impl MotionQueue {
    /// Create a queue and the receiver of its accepted frames.
    pub fn new(
        classifier: Box<dyn AnimalClassifier>,
        settings: MotionQueueSettings,
    ) -> (Self, Receiver<Frame>) {
        let (tx, rx) = channel::unbounded();
        let queue = Self {
            classifier,
            settings,
            state: SegmentState::Closed,
            segment: Vec::new(),
            output: tx,
            segments_closed: 0,
        };
        (queue, rx)
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Frames buffered in the open segment.
    pub fn pending(&self) -> usize {
        self.segment.len()
    }

    pub fn segments_closed(&self) -> u64 {
        self.segments_closed
    }

    /// Classify the buffered frames and publish the accepted ones.
    fn flush(&mut self) -> Result<()> {
        let segment = std::mem::take(&mut self.segment);
        let total = segment.len();
        let mut accepted = 0usize;
        for (frame, score) in segment {
            let result = self.classifier.classify(&frame.image)?;
            if !result.is_animal {
                continue;
            }
            log::debug!(
                "frame {} accepted (motion {:.1}, confidence {:.2})",
                frame.index,
                score,
                result.confidence
            );
            self.output
                .send(frame)
                .map_err(|_| anyhow!("filter output receiver dropped"))?;
            accepted += 1;
        }
        log::debug!("motion segment flushed: {}/{} frames accepted", accepted, total);
        Ok(())
    }
}

impl SegmentSink for MotionQueue {
    fn put(&mut self, frame: Frame, score: f64) -> Result<()> {
        if self.state == SegmentState::Closed {
            log::debug!("motion segment opened at frame {}", frame.index);
            self.state = SegmentState::Open;
        }
        self.segment.push((frame, score));
        let limit = self.settings.max_segment_frames;
        if limit > 0 && self.segment.len() >= limit {
            self.flush()?;
        }
        Ok(())
    }

    fn end_motion_sequence(&mut self) -> Result<()> {
        if self.state == SegmentState::Closed {
            return Ok(());
        }
        self.state = SegmentState::Closed;
        self.segments_closed += 1;
        self.flush()
    }
}
