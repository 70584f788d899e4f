//! Outbound delivery of classification results and stable detections

use crate::processing::events::{ClassificationResult, StableDetectionEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::info;

/// Consumer of pipeline output. Called on the pipeline thread, in order.
pub trait DetectionSink: Send {
    fn on_result(&mut self, _result: &ClassificationResult) {}

    fn on_stable(&mut self, _event: &StableDetectionEvent) {}
}

/// Activity log of identifications.
///
/// Per-frame results are logged by the pipeline itself when
/// `PipelineConfig::log_results` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl DetectionSink for LogSink {
    fn on_stable(&mut self, event: &StableDetectionEvent) {
        info!(
            label = %event.label,
            confidence = event.confidence,
            detected_at = %event.detected_at.to_rfc3339(),
            "Fish identified: {} ({:.1}%)",
            event.label,
            event.confidence * 100.0
        );
    }
}

/// Pipeline output as a single ordered stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Result(ClassificationResult),
    Stable(StableDetectionEvent),
}

/// Forwards everything to a channel for another thread (sorting logic, UI).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PipelineEvent>,
    results: bool,
}

impl ChannelSink {
    /// Sink forwarding both per-frame results and stable detections.
    pub fn channel() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx, results: true }, rx)
    }

    /// Sink forwarding stable detections only.
    pub fn stable_only() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx, results: false }, rx)
    }
}

impl DetectionSink for ChannelSink {
    fn on_result(&mut self, result: &ClassificationResult) {
        if self.results {
            // receiver gone: nothing left to notify
            let _ = self.tx.send(PipelineEvent::Result(result.clone()));
        }
    }

    fn on_stable(&mut self, event: &StableDetectionEvent) {
        let _ = self.tx.send(PipelineEvent::Stable(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(confidence: f32, timestamp: f64) -> ClassificationResult {
        ClassificationResult {
            label: "nila".to_string(),
            class_index: 1,
            confidence,
            timestamp,
        }
    }

    #[test]
    fn test_channel_sink_preserves_order() {
        let (mut sink, rx) = ChannelSink::channel();
        let first = result(0.9, 1.0);
        sink.on_result(&first);
        let event = StableDetectionEvent::from_result(&first);
        sink.on_stable(&event);

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Result(first));
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Stable(event));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stable_only_sink_skips_results() {
        let (mut sink, rx) = ChannelSink::stable_only();
        sink.on_result(&result(0.9, 1.0));
        assert!(rx.try_recv().is_err());
        sink.on_stable(&StableDetectionEvent::from_result(&result(0.9, 1.0)));
        assert!(matches!(rx.try_recv().unwrap(), PipelineEvent::Stable(_)));
    }

    #[test]
    fn test_log_sink_accepts_pipeline_output() {
        let mut sink: Box<dyn DetectionSink> = Box::new(LogSink::new());
        let sample = result(0.95, 2.0);
        sink.on_result(&sample);
        sink.on_stable(&StableDetectionEvent::from_result(&sample));
    }

    #[test]
    fn test_sink_survives_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.on_result(&result(0.5, 0.0));
        sink.on_stable(&StableDetectionEvent::from_result(&result(0.9, 1.0)));
    }
}
