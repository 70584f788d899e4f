//! Single-frame image classification

use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::labels::LabelList;
use crate::models::tensor::{preprocess, InputSpec, ModelInput};
use std::path::Path;
use tracing::{info, trace};

/// A loaded, immutable model that maps one input batch to class scores.
pub trait ModelBackend: Send + Sync {
    fn input_spec(&self) -> InputSpec;

    /// Forward pass returning one probability per class.
    fn forward(&self, input: &ModelInput) -> Result<Vec<f32>, VisionError>;
}

/// Deserializes a model artifact into a [`ModelBackend`].
pub trait ModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelBackend>, VisionError>;
}

/// Best class for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Model plus label list, loaded once and shared read-only.
pub struct Classifier {
    model: Box<dyn ModelBackend>,
    labels: LabelList,
    spec: InputSpec,
    threshold: f32,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("spec", &self.spec)
            .field("labels", &self.labels.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Classifier {
    /// Load the ONNX model and label list named by `config`.
    #[cfg(feature = "onnx")]
    pub fn load(config: &crate::config::ModelConfig) -> Result<Self, VisionError> {
        Self::load_with(
            &crate::models::onnx::OnnxLoader,
            &config.model_path,
            &config.labels_path,
            config.confidence_threshold,
        )
    }

    /// Load the model with `loader`, then the label list.
    pub fn load_with(
        loader: &dyn ModelLoader,
        model_path: &Path,
        labels_path: &Path,
        threshold: f32,
    ) -> Result<Self, VisionError> {
        if !model_path.is_file() {
            return Err(VisionError::ModelLoad(format!("Model file not found: {:?}", model_path)));
        }

        let model = loader.load(model_path).map_err(|e| match e {
            VisionError::ModelLoad(msg) => VisionError::ModelLoad(msg),
            other => VisionError::ModelLoad(format!("{:?}: {}", model_path, other)),
        })?;
        let spec = model.input_spec();
        info!(
            "Model loaded from {:?}: input {}x{} {:?}",
            model_path, spec.width, spec.height, spec.layout
        );

        let labels = LabelList::load(labels_path)?;
        info!("Labels loaded from {:?}: {} classes", labels_path, labels.len());

        Self::from_parts(model, labels, threshold)
    }

    /// Assemble a classifier from an already loaded model and label list.
    pub fn from_parts(model: Box<dyn ModelBackend>, labels: LabelList, threshold: f32) -> Result<Self, VisionError> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(VisionError::Config(format!("Confidence threshold {} outside [0, 1]", threshold)));
        }
        let spec = model.input_spec();
        Ok(Self {
            model,
            labels,
            spec,
            threshold,
        })
    }

    /// Resolution (width, height) every frame is resized to.
    pub fn input_size(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    pub fn input_spec(&self) -> &InputSpec {
        &self.spec
    }

    pub fn labels(&self) -> &LabelList {
        &self.labels
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn preprocess(&self, frame: &Frame) -> Result<ModelInput, VisionError> {
        preprocess(frame, &self.spec)
    }

    /// Classify a frame: preprocess, forward pass, argmax.
    pub fn infer(&self, frame: &Frame) -> Result<Classification, VisionError> {
        let input = self.preprocess(frame)?;
        let scores = self.model.forward(&input)?;
        let (class_index, score) = argmax(&scores)?;

        let label = self.labels.get(class_index).ok_or_else(|| {
            VisionError::Inference(format!(
                "Class index {} has no label ({} labels loaded)",
                class_index,
                self.labels.len()
            ))
        })?;

        trace!("Classified frame as {} ({:.3})", label, score);
        Ok(Classification {
            class_index,
            label: label.to_string(),
            confidence: score.clamp(0.0, 1.0),
        })
    }
}

/// Index and value of the first maximal score.
fn argmax(scores: &[f32]) -> Result<(usize, f32), VisionError> {
    if scores.is_empty() {
        return Err(VisionError::Inference("Model produced no scores".to_string()));
    }
    if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
        return Err(VisionError::Inference(format!("Non-finite score at class {}", bad)));
    }

    let mut best = (0, scores[0]);
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > best.1 {
            best = (index, score);
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;
    use crate::models::tensor::TensorLayout;

    struct FixedScores(Vec<f32>);

    impl ModelBackend for FixedScores {
        fn input_spec(&self) -> InputSpec {
            InputSpec::new(4, 4, TensorLayout::Nhwc, ChannelOrder::Rgb).unwrap()
        }

        fn forward(&self, input: &ModelInput) -> Result<Vec<f32>, VisionError> {
            assert_eq!(input.shape, [1, 4, 4, 3]);
            Ok(self.0.clone())
        }
    }

    fn classifier(scores: Vec<f32>, labels: &[&str]) -> Classifier {
        Classifier::from_parts(
            Box::new(FixedScores(scores)),
            LabelList::from_lines(labels.iter().copied()).unwrap(),
            0.8,
        )
        .unwrap()
    }

    fn frame() -> Frame {
        Frame::new(10, 10, ChannelOrder::Bgr, vec![128; 300]).unwrap()
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.1, 0.45, 0.45]).unwrap(), (1, 0.45));
        assert_eq!(argmax(&[0.9]).unwrap(), (0, 0.9));
        assert!(argmax(&[]).is_err());
        assert!(argmax(&[0.2, f32::NAN]).is_err());
    }

    #[test]
    fn test_infer_returns_best_label() {
        let classifier = classifier(vec![0.05, 0.9, 0.05], &["bandeng", "nila", "lele"]);
        let result = classifier.infer(&frame()).unwrap();
        assert_eq!(result.class_index, 1);
        assert_eq!(result.label, "nila");
        assert_eq!(result.confidence, 0.9);
        assert_eq!(classifier.input_size(), (4, 4));
    }

    #[test]
    fn test_infer_index_without_label_fails_call() {
        let classifier = classifier(vec![0.1, 0.1, 0.8], &["bandeng", "nila"]);
        assert!(matches!(classifier.infer(&frame()), Err(VisionError::Inference(_))));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let classifier = classifier(vec![1.0000002, 0.0], &["bandeng", "nila"]);
        assert_eq!(classifier.infer(&frame()).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_threshold_must_be_probability() {
        let labels = LabelList::from_lines(["a"]).unwrap();
        let result = Classifier::from_parts(Box::new(FixedScores(vec![1.0])), labels, 1.5);
        assert!(matches!(result, Err(VisionError::Config(_))));
    }
}
