//! Tests for the detection loop

use parking_lot::Mutex;
use sortline_eye::config::PipelineConfig;
use sortline_eye::frame::{ChannelOrder, Frame, FrameReader, FrameSlot};
use sortline_eye::models::{Classifier, InputSpec, LabelList, ModelBackend, ModelInput, TensorLayout};
use sortline_eye::processing::{
    ChannelSink, Clock, DetectionPipeline, PipelineEvent, SkipReason, StepOutcome, TrackerState,
};
use sortline_eye::VisionError;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone, Default)]
struct ManualClock(Arc<Mutex<f64>>);

impl ManualClock {
    fn set(&self, t: f64) {
        *self.0.lock() = t;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.0.lock()
    }
}

/// Replays queued score vectors; an empty queue repeats the fallback.
struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Result<Vec<f32>, VisionError>>>>,
}

impl ModelBackend for ScriptedModel {
    fn input_spec(&self) -> InputSpec {
        InputSpec::new(4, 4, TensorLayout::Nhwc, ChannelOrder::Rgb).unwrap()
    }

    fn forward(&self, _input: &ModelInput) -> Result<Vec<f32>, VisionError> {
        self.script.lock().pop_front().unwrap_or_else(|| Ok(vec![1.0, 0.0]))
    }
}

struct Harness {
    slot: Arc<FrameSlot>,
    clock: ManualClock,
    script: Arc<Mutex<VecDeque<Result<Vec<f32>, VisionError>>>>,
    pipeline: DetectionPipeline,
}

impl Harness {
    fn new(window: f64) -> Self {
        let slot = Arc::new(FrameSlot::new());
        let clock = ManualClock::default();
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let model = ScriptedModel {
            script: Arc::clone(&script),
        };
        let labels = LabelList::from_lines(["bandeng", "nila"]).unwrap();
        let classifier = Arc::new(Classifier::from_parts(Box::new(model), labels, 0.8).unwrap());
        let pipeline = DetectionPipeline::new(FrameReader::new(Arc::clone(&slot)), classifier, window)
            .with_clock(Box::new(clock.clone()));
        Self {
            slot,
            clock,
            script,
            pipeline,
        }
    }

    fn publish(&self) -> u64 {
        self.slot
            .publish(Frame::new(8, 8, ChannelOrder::Bgr, vec![100; 8 * 8 * 3]).unwrap())
            .unwrap()
    }

    /// Queue a "nila" score of `confidence` and step at time `t`.
    fn step_nila(&mut self, t: f64, confidence: f32) -> StepOutcome {
        self.script.lock().push_back(Ok(vec![1.0 - confidence, confidence]));
        self.clock.set(t);
        self.pipeline.step()
    }
}

#[test]
fn test_skips_until_first_frame() {
    let mut harness = Harness::new(1.0);
    assert!(matches!(harness.pipeline.step(), StepOutcome::Skipped(SkipReason::NotReady)));
    assert_eq!(harness.pipeline.stats().skipped, 1);
    assert_eq!(harness.pipeline.stats().classified, 0);

    harness.publish();
    assert!(matches!(harness.pipeline.step(), StepOutcome::Classified { .. }));
}

#[test]
fn test_closed_slot_is_reported() {
    let mut harness = Harness::new(1.0);
    harness.publish();
    harness.slot.close();
    assert!(matches!(harness.pipeline.step(), StepOutcome::Skipped(SkipReason::Closed)));
}

#[test]
fn test_stable_event_after_window() {
    let mut harness = Harness::new(1.0);
    harness.publish();

    for (t, c) in [(0.0, 0.85), (0.3, 0.90), (0.6, 0.95)] {
        match harness.step_nila(t, c) {
            StepOutcome::Classified { event, result } => {
                assert!(event.is_none());
                assert_eq!(result.timestamp, t);
                assert_eq!(result.label, "nila");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    match harness.step_nila(1.05, 0.88) {
        StepOutcome::Classified { event: Some(event), .. } => {
            assert_eq!(event.timestamp, 1.05);
            assert_eq!(event.label, "nila");
        }
        other => panic!("expected stable event, got {:?}", other),
    }

    // same streak continues: no second event
    assert!(matches!(
        harness.step_nila(1.5, 0.9),
        StepOutcome::Classified { event: None, .. }
    ));
    assert_eq!(harness.pipeline.stats().stable_events, 1);
}

#[test]
fn test_dip_restarts_window() {
    let mut harness = Harness::new(1.0);
    harness.publish();

    harness.step_nila(0.0, 0.90);
    harness.step_nila(0.5, 0.50);
    harness.step_nila(0.9, 0.95);
    assert_eq!(harness.pipeline.tracker().state(), TrackerState::Pending { start: 0.9 });
    assert!(matches!(
        harness.step_nila(1.8, 0.95),
        StepOutcome::Classified { event: None, .. }
    ));
    assert!(matches!(
        harness.step_nila(1.95, 0.90),
        StepOutcome::Classified { event: Some(_), .. }
    ));
}

#[test]
fn test_failed_inference_leaves_tracker_untouched() {
    let mut harness = Harness::new(1.0);
    harness.publish();
    harness.step_nila(0.0, 0.9);

    harness
        .script
        .lock()
        .push_back(Err(VisionError::Inference("device lost".to_string())));
    harness.clock.set(0.5);
    match harness.pipeline.step() {
        StepOutcome::Failed(err) => assert!(err.is_per_call()),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(harness.pipeline.tracker().state(), TrackerState::Pending { start: 0.0 });
    assert_eq!(harness.pipeline.stats().failures, 1);

    assert!(matches!(
        harness.step_nila(1.0, 0.9),
        StepOutcome::Classified { event: Some(_), .. }
    ));
}

#[test]
fn test_sinks_receive_results_then_event() {
    let mut harness = Harness::new(0.5);
    let (sink, rx) = ChannelSink::channel();
    harness.pipeline.add_sink(Box::new(sink));
    harness.publish();

    harness.step_nila(0.0, 0.9);
    harness.step_nila(0.5, 0.9);

    let events: Vec<PipelineEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], PipelineEvent::Result(r) if r.timestamp == 0.0));
    assert!(matches!(&events[1], PipelineEvent::Result(r) if r.timestamp == 0.5));
    assert!(matches!(&events[2], PipelineEvent::Stable(e) if e.timestamp == 0.5 && e.label == "nila"));
}

#[test]
fn test_stable_only_sink() {
    let mut harness = Harness::new(0.0);
    let (sink, rx) = ChannelSink::stable_only();
    harness.pipeline.add_sink(Box::new(sink));
    harness.publish();

    harness.step_nila(0.0, 0.9);
    harness.step_nila(0.1, 0.3);
    harness.step_nila(0.2, 0.9);

    let stable: Vec<PipelineEvent> = rx.try_iter().collect();
    assert_eq!(stable.len(), 2);
    assert!(stable.iter().all(|e| matches!(e, PipelineEvent::Stable(_))));
}

#[test]
fn test_repeated_frames_are_counted() {
    let mut harness = Harness::new(1.0);
    harness.publish();
    harness.step_nila(0.0, 0.9);
    harness.step_nila(0.1, 0.9);
    harness.publish();
    harness.step_nila(0.2, 0.9);

    let stats = harness.pipeline.stats();
    assert_eq!(stats.classified, 3);
    assert_eq!(stats.repeated_frames, 1);
}

#[test]
fn test_reset_discards_streak() {
    let mut harness = Harness::new(1.0);
    harness.publish();
    harness.step_nila(0.0, 0.9);
    harness.pipeline.reset();
    assert_eq!(harness.pipeline.tracker().state(), TrackerState::Idle);

    assert!(matches!(
        harness.step_nila(1.0, 0.9),
        StepOutcome::Classified { event: None, .. }
    ));
    assert_eq!(harness.pipeline.tracker().state(), TrackerState::Pending { start: 1.0 });
}

#[test]
fn test_run_returns_when_stop_already_set() {
    let mut harness = Harness::new(1.0);
    harness.publish();
    let stop = AtomicBool::new(true);
    let stats = harness.pipeline.run(&stop);
    assert_eq!(stats.iterations, 0);
}

#[test]
fn test_run_exits_when_source_closes() {
    let harness = Harness::new(1.0);
    harness.publish();
    let slot = Arc::clone(&harness.slot);
    let mut pipeline = harness.pipeline.with_config(PipelineConfig {
        poll_interval_ms: 1,
        log_results: true,
    });

    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        slot.close();
    });

    let stop = AtomicBool::new(false);
    let stats = pipeline.run(&stop);
    closer.join().unwrap();

    assert!(stats.classified >= 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.iterations, stats.classified + stats.skipped + stats.failures);
}
