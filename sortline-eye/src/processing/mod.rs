//! Detection processing: stabilization and orchestration

pub mod events;
pub mod pipeline;
pub mod sink;
pub mod stability;

pub use events::{ClassificationResult, StableDetectionEvent};
pub use pipeline::{Clock, DetectionPipeline, MonotonicClock, PipelineStats, SkipReason, StepOutcome};
pub use sink::{ChannelSink, DetectionSink, LogSink, PipelineEvent};
pub use stability::{StabilityTracker, TrackerState};
