//! Frame filtering pipeline.
//!
//! Viewed from the outside, `Filter` reads frames from a camera and outputs
//! only frames containing animals. Internally:
//!
//! 1. The `FrameDispatcher` scores each frame with the motion stage and pushes
//!    frames at or above the SotV threshold into the motion queue.
//! 2. The `MotionQueue` applies the animal classifier to each closed motion
//!    segment and publishes accepted frames.
//! 3. `Filter::get` pulls the next accepted frame.
//!
//! The dispatcher runs on its own thread; the output is a channel, which absorbs
//! the burstiness of segment-at-a-time classification.

use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};

pub mod dispatcher;
pub mod motion_queue;

pub use dispatcher::{Dispatch, DispatcherHandle, FrameDispatcher};
pub use motion_queue::{MotionQueue, MotionQueueSettings, SegmentSink, SegmentState};

use crate::detect::{AnimalClassifier, MotionScorer};
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// Settings for the filter pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSettings {
    /// SotV threshold: frames scoring at or above it contain motion.
    pub sotv_threshold: f64,
    pub motion_queue: MotionQueueSettings,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            sotv_threshold: 5000.0,
            motion_queue: MotionQueueSettings::default(),
        }
    }
}

/// The complete filtering pipeline.
pub struct Filter {
    framerate: u32,
    output: Receiver<Frame>,
    dispatcher: DispatcherHandle,
}

impl Filter {
    /// Build the pipeline with the given motion and animal stages and start it.
    pub fn new(
        source: Box<dyn FrameSource>,
        settings: &FilterSettings,
        scorer: Box<dyn MotionScorer>,
        mut classifier: Box<dyn AnimalClassifier>,
    ) -> Result<Self> {
        classifier.warm_up()?;
        log::info!(
            "Filter stages: motion={} animal={}",
            scorer.name(),
            classifier.name()
        );
        let (queue, output) = MotionQueue::new(classifier, settings.motion_queue.clone());
        Self::with_sink(source, settings.sotv_threshold, scorer, Box::new(queue), output)
    }

    /// Build the pipeline around a custom segment sink whose accepted frames
    /// arrive on `output`.
    pub fn with_sink(
        source: Box<dyn FrameSource>,
        sotv_threshold: f64,
        scorer: Box<dyn MotionScorer>,
        sink: Box<dyn SegmentSink>,
        output: Receiver<Frame>,
    ) -> Result<Self> {
        let framerate = source.framerate();
        let dispatcher = FrameDispatcher::new(scorer, sink, sotv_threshold).spawn(source)?;
        log::debug!("Filter started");
        Ok(Self {
            framerate,
            output,
            dispatcher,
        })
    }

    pub fn framerate(&self) -> u32 {
        self.framerate
    }

    /// Block until the next animal frame.
    ///
    /// Fails once the pipeline has stopped and every accepted frame was taken.
    pub fn get(&self) -> Result<Frame> {
        self.output
            .recv()
            .map_err(|_| anyhow!("filter pipeline stopped"))
    }

    /// Like `get`, giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<Frame>> {
        match self.output.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("filter pipeline stopped")),
        }
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Stop the dispatcher and wait for it. Frames in flight are dropped.
    pub fn close(&self) {
        self.dispatcher.close();
        log::debug!("Filter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::detect::{StubClassifier, StubScorer};
    use crate::ingest::ChannelSource;

    fn frame(index: u64, motion: u8, bright: bool) -> Frame {
        let fill = if bright { 250 } else { 5 };
        Frame::captured_at(vec![fill; 16], vec![motion; 4], index, index as f64)
    }

    fn start(timeout: Duration) -> (crossbeam::channel::Sender<Frame>, Filter) {
        let (tx, source) = ChannelSource::new(25, timeout);
        let settings = FilterSettings {
            sotv_threshold: 100.0,
            motion_queue: MotionQueueSettings::default(),
        };
        let filter = Filter::new(
            Box::new(source),
            &settings,
            Box::new(StubScorer::default()),
            Box::new(StubClassifier::new(0.5)),
        )
        .unwrap();
        (tx, filter)
    }

    #[test]
    fn reports_source_framerate() {
        let (_tx, filter) = start(Duration::from_millis(10));
        assert_eq!(filter.framerate(), 25);
        filter.close();
    }

    #[test]
    fn outputs_only_animal_frames_from_motion_segments() {
        let (tx, filter) = start(Duration::from_millis(200));

        tx.send(frame(0, 0, true)).unwrap(); // no motion
        tx.send(frame(1, 100, true)).unwrap(); // motion, animal
        tx.send(frame(2, 100, false)).unwrap(); // motion, no animal
        tx.send(frame(3, 100, true)).unwrap(); // motion, animal
        tx.send(frame(4, 0, true)).unwrap(); // closes the segment

        let first = filter.get().unwrap();
        let second = filter.get().unwrap();
        assert_eq!((first.index, second.index), (1, 3));
        assert!(filter
            .get_timeout(Duration::from_millis(100))
            .unwrap()
            .is_none());
        filter.close();
    }

    #[test]
    fn input_fault_closes_open_segment() {
        let (tx, filter) = start(Duration::from_millis(50));
        tx.send(frame(0, 200, true)).unwrap();

        // No closing frame: the pull timeout ends the segment.
        let out = filter
            .get_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("frame after fault");
        assert_eq!(out.index, 0);
        filter.close();
    }

    struct ColdClassifier;

    impl AnimalClassifier for ColdClassifier {
        fn name(&self) -> &'static str {
            "cold"
        }

        fn classify(&mut self, _image: &[u8]) -> Result<crate::detect::Classification> {
            Err(anyhow!("not loaded"))
        }

        fn warm_up(&mut self) -> Result<()> {
            Err(anyhow!("model missing"))
        }
    }

    #[test]
    fn failed_warm_up_aborts_start() {
        let (_tx, source) = ChannelSource::new(25, Duration::from_millis(10));
        let result = Filter::new(
            Box::new(source),
            &FilterSettings::default(),
            Box::new(StubScorer::default()),
            Box::new(ColdClassifier),
        );
        assert!(result.is_err());
    }

    #[test]
    fn get_fails_after_close() {
        let (_tx, filter) = start(Duration::from_millis(10));
        let start = Instant::now();
        filter.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!filter.is_running());
        assert!(filter.get().is_err());
    }
}
