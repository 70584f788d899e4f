//! Model loading and inference

pub mod classifier;
pub mod labels;
pub mod tensor;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{Classification, Classifier, ModelBackend, ModelLoader};
pub use labels::LabelList;
pub use tensor::{preprocess, InputSpec, ModelInput, TensorLayout};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxLoader, OnnxModel};
