//! Error types for sortline-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Label load error: {0}")]
    LabelLoad(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    Ort(String),
}

impl VisionError {
    /// Startup failures after which the pipeline must not run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VisionError::SourceUnavailable(_)
                | VisionError::ModelLoad(_)
                | VisionError::LabelLoad(_)
                | VisionError::Config(_)
        )
    }

    /// Failures scoped to a single inference call.
    pub fn is_per_call(&self) -> bool {
        matches!(self, VisionError::InvalidFrame(_) | VisionError::Inference(_))
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Ort(err.to_string())
    }
}
