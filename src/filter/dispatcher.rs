//! Frame dispatcher.
//!
//! Pulls frames from the camera, scores them for motion and routes them:
//! - score >= SotV threshold: forward `(frame, score)` to the segment sink
//! - score below threshold: close the current motion segment
//! - input fault: close the current segment and reset the scorer, then keep
//!   waiting for frames
//!
//! The dispatcher holds no buffer of its own; backpressure from the sink is
//! its only throttle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use super::motion_queue::SegmentSink;
use crate::detect::MotionScorer;
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// What one dispatch cycle did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dispatch {
    /// The frame was forwarded as part of a motion segment.
    Forwarded { index: u64, score: f64 },
    /// The frame scored below threshold and was dropped; the segment was closed.
    Closed { index: u64, score: f64 },
    /// The pull failed; the segment was closed and the scorer reset.
    Fault,
}

pub struct FrameDispatcher {
    scorer: Box<dyn MotionScorer>,
    sink: Box<dyn SegmentSink>,
    threshold: f64,
}

impl FrameDispatcher {
    pub fn new(scorer: Box<dyn MotionScorer>, sink: Box<dyn SegmentSink>, threshold: f64) -> Self {
        Self {
            scorer,
            sink,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Route the result of one pull from the camera.
    ///
    /// Errors come only from the sink and are fatal to the dispatcher.
    pub fn dispatch(&mut self, pulled: Result<Frame>) -> Result<Dispatch> {
        let frame = match pulled {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("frame input fault: {}", e);
                self.sink.end_motion_sequence()?;
                self.scorer.reset();
                return Ok(Dispatch::Fault);
            }
        };

        let index = frame.index;
        let score = self.scorer.score(&frame.motion);
        if score >= self.threshold {
            self.sink.put(frame, score)?;
            Ok(Dispatch::Forwarded { index, score })
        } else {
            self.sink.end_motion_sequence()?;
            Ok(Dispatch::Closed { index, score })
        }
    }

    /// Run the dispatcher on its own thread, pulling from `source`.
    pub fn spawn(mut self, mut source: Box<dyn FrameSource>) -> Result<DispatcherHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let join = thread::Builder::new()
            .name("frame-dispatcher".to_string())
            .spawn(move || {
                log::debug!("frame dispatcher started (threshold {})", self.threshold);
                while !stop_thread.load(Ordering::SeqCst) {
                    let pulled = source.next_frame();
                    // Frames pulled after close are dropped.
                    if stop_thread.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = self.dispatch(pulled) {
                        log::error!("frame dispatcher stopped: {}", e);
                        break;
                    }
                }
                log::debug!("frame dispatcher exited");
            })?;

        Ok(DispatcherHandle {
            stop,
            join: Mutex::new(Some(join)),
        })
    }
}

/// Owner's handle on a running dispatcher.
pub struct DispatcherHandle {
    stop: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherHandle {
    /// Stop the dispatcher and wait for it. Returns once the current pull ends.
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handle = match self.join.lock() {
            Ok(mut join) => join.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("frame dispatcher panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        match self.join.lock() {
            Ok(join) => join.as_ref().is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::{Duration, Instant};

    use crate::detect::StubScorer;
    use crate::ingest::ChannelSource;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum SinkEvent {
        Put(u64),
        End,
    }

    /// Sink that records every call, tracking segment state like a real sink.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Arc<Mutex<Vec<SinkEvent>>>,
    }

    impl SegmentSink for RecordingSink {
        fn put(&mut self, frame: Frame, _score: f64) -> Result<()> {
            self.events.lock().unwrap().push(SinkEvent::Put(frame.index));
            Ok(())
        }

        fn end_motion_sequence(&mut self) -> Result<()> {
            self.events.lock().unwrap().push(SinkEvent::End);
            Ok(())
        }
    }

    /// Scorer whose score is the first motion byte; counts resets.
    #[derive(Clone, Default)]
    struct FirstByteScorer {
        resets: Arc<Mutex<u32>>,
    }

    impl MotionScorer for FirstByteScorer {
        fn name(&self) -> &'static str {
            "first-byte"
        }

        fn score(&mut self, motion: &[u8]) -> f64 {
            motion.first().copied().unwrap_or(0) as f64
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    fn frame(index: u64, score: u8) -> Frame {
        Frame::captured_at(vec![], vec![score], index, index as f64)
    }

    const LOW: u8 = 1;
    const HIGH: u8 = 9;

    #[test]
    fn motion_run_forms_one_segment() {
        let sink = RecordingSink::default();
        let scorer = FirstByteScorer::default();
        let mut dispatcher =
            FrameDispatcher::new(Box::new(scorer.clone()), Box::new(sink.clone()), 5.0);

        let scores = [LOW, HIGH, HIGH, LOW];
        let outcomes: Vec<Dispatch> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| dispatcher.dispatch(Ok(frame(i as u64, s))).unwrap())
            .collect();

        assert_eq!(
            outcomes,
            vec![
                Dispatch::Closed { index: 0, score: 1.0 },
                Dispatch::Forwarded { index: 1, score: 9.0 },
                Dispatch::Forwarded { index: 2, score: 9.0 },
                Dispatch::Closed { index: 3, score: 1.0 },
            ]
        );
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![
                SinkEvent::End,
                SinkEvent::Put(1),
                SinkEvent::Put(2),
                SinkEvent::End,
            ]
        );
        assert_eq!(*scorer.resets.lock().unwrap(), 0);
    }

    #[test]
    fn fault_closes_segment_and_resets_scorer() {
        let sink = RecordingSink::default();
        let scorer = FirstByteScorer::default();
        let mut dispatcher =
            FrameDispatcher::new(Box::new(scorer.clone()), Box::new(sink.clone()), 5.0);

        dispatcher.dispatch(Ok(frame(0, HIGH))).unwrap();
        assert_eq!(
            dispatcher.dispatch(Err(anyhow!("camera hiccup"))).unwrap(),
            Dispatch::Fault
        );
        // A second fault with no open segment behaves the same way.
        assert_eq!(
            dispatcher.dispatch(Err(anyhow!("camera hiccup"))).unwrap(),
            Dispatch::Fault
        );

        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![SinkEvent::Put(0), SinkEvent::End, SinkEvent::End]
        );
        assert_eq!(*scorer.resets.lock().unwrap(), 2);
    }

    #[test]
    fn score_equal_to_threshold_is_motion() {
        let sink = RecordingSink::default();
        let mut dispatcher =
            FrameDispatcher::new(Box::new(FirstByteScorer::default()), Box::new(sink), 5.0);
        assert_eq!(
            dispatcher.dispatch(Ok(frame(0, 5))).unwrap(),
            Dispatch::Forwarded { index: 0, score: 5.0 }
        );
    }

    struct FailingSink;

    impl SegmentSink for FailingSink {
        fn put(&mut self, _frame: Frame, _score: f64) -> Result<()> {
            Err(anyhow!("sink full"))
        }

        fn end_motion_sequence(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_stops_dispatcher() {
        let (tx, source) = ChannelSource::new(20, Duration::from_millis(10));
        let dispatcher =
            FrameDispatcher::new(Box::new(StubScorer::default()), Box::new(FailingSink), 0.0);
        let handle = dispatcher.spawn(Box::new(source)).unwrap();
        tx.send(frame(0, HIGH)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!handle.is_running());
    }

    #[test]
    fn spawned_dispatcher_survives_faults_and_closes() {
        let (tx, source) = ChannelSource::new(20, Duration::from_millis(10));
        let sink = RecordingSink::default();
        let dispatcher = FrameDispatcher::new(
            Box::new(FirstByteScorer::default()),
            Box::new(sink.clone()),
            5.0,
        );
        let handle = dispatcher.spawn(Box::new(source)).unwrap();

        // Let a few pulls time out before any frame arrives.
        thread::sleep(Duration::from_millis(50));
        tx.send(frame(0, HIGH)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !sink.events.lock().unwrap().contains(&SinkEvent::Put(0)) {
            assert!(Instant::now() < deadline, "frame never dispatched");
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_running());

        let start = Instant::now();
        handle.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!handle.is_running());
    }
}
