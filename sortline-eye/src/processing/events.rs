//! Values emitted by the detection loop

use crate::models::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One classified frame. `timestamp` is seconds on the pipeline clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub timestamp: f64,
}

impl ClassificationResult {
    pub fn new(classification: Classification, timestamp: f64) -> Self {
        Self {
            label: classification.label,
            class_index: classification.class_index,
            confidence: classification.confidence,
            timestamp,
        }
    }
}

/// A confirmed identification, emitted once per qualifying streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableDetectionEvent {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    /// Pipeline clock time of the sample that closed the window
    pub timestamp: f64,
    /// Wall clock time, for the activity log
    pub detected_at: DateTime<Utc>,
}

impl StableDetectionEvent {
    pub fn from_result(result: &ClassificationResult) -> Self {
        Self {
            label: result.label.clone(),
            class_index: result.class_index,
            confidence: result.confidence,
            timestamp: result.timestamp,
            detected_at: Utc::now(),
        }
    }
}
