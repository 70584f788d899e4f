//! sortline-eye: detection core for the fish sorting line
//!
//! A background acquisition thread keeps the newest camera frame in a
//! single-capacity slot; the detection loop classifies whatever frame is
//! current and debounces the noisy per-frame results into one stable
//! identification per continuous streak.

pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod processing;

pub use camera::{CaptureBackend, CaptureDevice, FrameSource, SourceId};
pub use config::VisionConfig;
pub use error::VisionError;
pub use frame::{ChannelOrder, Frame, FrameReader, FrameSlot, SlotRead};
pub use models::{Classification, Classifier, LabelList};
pub use processing::{
    ClassificationResult, DetectionPipeline, StabilityTracker, StableDetectionEvent, StepOutcome, TrackerState,
};
