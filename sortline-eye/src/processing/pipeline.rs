//! Detection loop: latest frame -> classifier -> stability tracker -> sinks

use crate::config::PipelineConfig;
use crate::error::VisionError;
use crate::frame::{FrameReader, SlotRead};
use crate::models::Classifier;
use crate::processing::events::{ClassificationResult, StableDetectionEvent};
use crate::processing::sink::DetectionSink;
use crate::processing::stability::StabilityTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Time source for sample timestamps, in seconds.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Seconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No frame captured yet
    NotReady,
    /// Frame source stopped
    Closed,
}

/// What one iteration of the loop did.
#[derive(Debug)]
pub enum StepOutcome {
    Skipped(SkipReason),
    Classified {
        result: ClassificationResult,
        event: Option<StableDetectionEvent>,
    },
    /// Inference failed for this frame; tracker state is unchanged.
    Failed(VisionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub iterations: u64,
    pub skipped: u64,
    pub classified: u64,
    /// Classifications of a frame that had already been classified
    pub repeated_frames: u64,
    pub stable_events: u64,
    pub failures: u64,
}

/// Polls the frame slot at its own cadence and debounces classifications.
pub struct DetectionPipeline {
    reader: FrameReader,
    classifier: Arc<Classifier>,
    tracker: StabilityTracker,
    clock: Box<dyn Clock>,
    sinks: Vec<Box<dyn DetectionSink>>,
    config: PipelineConfig,
    stats: PipelineStats,
    last_sequence: u64,
}

impl DetectionPipeline {
    pub fn new(reader: FrameReader, classifier: Arc<Classifier>, window_secs: f64) -> Self {
        let tracker = StabilityTracker::new(classifier.threshold(), window_secs);
        Self {
            reader,
            classifier,
            tracker,
            clock: Box::new(MonotonicClock::new()),
            sinks: Vec::new(),
            config: PipelineConfig::default(),
            stats: PipelineStats::default(),
            last_sequence: 0,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn DetectionSink>) {
        self.sinks.push(sink);
    }

    /// Run a single iteration.
    pub fn step(&mut self) -> StepOutcome {
        self.stats.iterations += 1;

        let (frame, sequence) = match self.reader.read() {
            SlotRead::Frame { frame, sequence } => (frame, sequence),
            SlotRead::NotReady => {
                self.stats.skipped += 1;
                return StepOutcome::Skipped(SkipReason::NotReady);
            }
            SlotRead::Closed => {
                self.stats.skipped += 1;
                return StepOutcome::Skipped(SkipReason::Closed);
            }
        };

        let classification = match self.classifier.infer(&frame) {
            Ok(classification) => classification,
            Err(e) => {
                self.stats.failures += 1;
                warn!("Inference failed on frame {}: {}", sequence, e);
                return StepOutcome::Failed(e);
            }
        };

        let result = ClassificationResult::new(classification, self.clock.now());
        self.stats.classified += 1;
        if sequence == self.last_sequence {
            self.stats.repeated_frames += 1;
        }
        self.last_sequence = sequence;

        if self.config.log_results {
            debug!(
                "Frame {}: {} ({:.3}) at t={:.3}",
                sequence, result.label, result.confidence, result.timestamp
            );
        }

        let event = self.tracker.update(&result);

        for sink in self.sinks.iter_mut() {
            sink.on_result(&result);
        }
        if let Some(event) = &event {
            self.stats.stable_events += 1;
            info!("Stable detection: {} ({:.3}) at t={:.3}", event.label, event.confidence, event.timestamp);
            for sink in self.sinks.iter_mut() {
                sink.on_stable(event);
            }
        }

        StepOutcome::Classified { result, event }
    }

    /// Loop until `stop` is set or the frame source closes.
    pub fn run(&mut self, stop: &AtomicBool) -> PipelineStats {
        let interval = self.config.poll_interval();
        info!("Detection loop started (poll interval {:?})", interval);

        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            if let StepOutcome::Skipped(SkipReason::Closed) = self.step() {
                info!("Frame source closed, leaving detection loop");
                break;
            }
            let elapsed = started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        info!(
            "Detection loop stopped: {} classified, {} stable, {} failed",
            self.stats.classified, self.stats.stable_events, self.stats.failures
        );
        self.stats
    }

    /// Discard any streak in progress (system stop/reset).
    pub fn reset(&mut self) {
        self.tracker.reset();
        info!("Stability tracker reset");
    }

    pub fn tracker(&self) -> &StabilityTracker {
        &self.tracker
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}
