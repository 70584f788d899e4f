//! Temporal debouncing of per-frame classifications

use crate::processing::events::{ClassificationResult, StableDetectionEvent};
use tracing::debug;

/// Tracker state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    /// No qualifying streak in progress
    Idle,
    /// Qualifying since `start` (pipeline seconds)
    Pending { start: f64 },
    /// Current streak already produced its event
    Stable,
}

/// Turns noisy per-frame confidences into a one-shot stable detection.
///
/// Only confidence is considered; the label may change within a streak and
/// the event carries the label of the sample that closes the window.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    threshold: f32,
    window: f64,
    state: TrackerState,
}

impl StabilityTracker {
    /// `window` is in the same unit as sample timestamps (seconds).
    pub fn new(threshold: f32, window: f64) -> Self {
        Self {
            threshold,
            window,
            state: TrackerState::Idle,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    /// Feed one sample. Returns an event on the Pending to Stable transition.
    pub fn update(&mut self, sample: &ClassificationResult) -> Option<StableDetectionEvent> {
        // NaN never qualifies
        if !(sample.confidence >= self.threshold) {
            if self.state != TrackerState::Idle {
                debug!(
                    "Confidence {:.3} below {:.3} at t={:.3}, tracker reset",
                    sample.confidence, self.threshold, sample.timestamp
                );
            }
            self.state = TrackerState::Idle;
            return None;
        }

        let start = match self.state {
            TrackerState::Stable => return None,
            TrackerState::Pending { start } => start,
            TrackerState::Idle => {
                self.state = TrackerState::Pending {
                    start: sample.timestamp,
                };
                sample.timestamp
            }
        };

        if sample.timestamp - start >= self.window {
            self.state = TrackerState::Stable;
            return Some(StableDetectionEvent::from_result(sample));
        }
        None
    }

    /// Force the tracker back to `Idle`.
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }
}
