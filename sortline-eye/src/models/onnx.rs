//! ONNX Runtime classifier backend

use crate::error::VisionError;
use crate::frame::ChannelOrder;
use crate::models::classifier::{ModelBackend, ModelLoader};
use crate::models::tensor::{InputSpec, ModelInput, TensorLayout};
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{info, warn};

/// Spatial size assumed when the model leaves its input dimensions dynamic.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Input signatures written by the exporters used for line models.
///
/// Keras/TensorFlow conversions keep the channels-last image input even
/// after ONNX conversion; PyTorch exports are channels-first. Both are
/// normalised here so preprocessing only sees an [`InputSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `[N, H, W, 3]`
    ChannelsLast,
    /// `[N, 3, H, W]`
    ChannelsFirst,
}

impl InputFormat {
    /// Resolve an input shape (dynamic dimensions as `-1`) into a format
    /// and a concrete spatial size.
    pub fn resolve(shape: &[i64]) -> Result<(InputFormat, u32, u32), VisionError> {
        let shape: Vec<i64> = match shape.len() {
            4 => shape.to_vec(),
            // Some converters drop the batch axis
            3 => std::iter::once(1).chain(shape.iter().copied()).collect(),
            n => {
                return Err(VisionError::ModelLoad(format!(
                    "Expected a rank 4 image input, got rank {} {:?}",
                    n, shape
                )))
            }
        };

        let batch = shape[0];
        if batch > 1 {
            return Err(VisionError::ModelLoad(format!("Fixed batch size {} is not supported", batch)));
        }

        let (format, height, width) = if shape[3] == 3 {
            (InputFormat::ChannelsLast, shape[1], shape[2])
        } else if shape[1] == 3 {
            (InputFormat::ChannelsFirst, shape[2], shape[3])
        } else {
            return Err(VisionError::ModelLoad(format!("Input {:?} is not a 3-channel image", shape)));
        };

        Ok((format, spatial(height)?, spatial(width)?))
    }

    pub fn layout(self) -> TensorLayout {
        match self {
            InputFormat::ChannelsLast => TensorLayout::Nhwc,
            InputFormat::ChannelsFirst => TensorLayout::Nchw,
        }
    }
}

fn spatial(dim: i64) -> Result<u32, VisionError> {
    if dim <= 0 {
        warn!("Model input has a dynamic spatial dimension, using {}", DEFAULT_INPUT_SIZE);
        return Ok(DEFAULT_INPUT_SIZE);
    }
    u32::try_from(dim).map_err(|_| VisionError::ModelLoad(format!("Input dimension {} out of range", dim)))
}

/// Name of the output holding class scores (the first one declared).
fn score_output(names: &[String], path: &Path) -> Result<String, VisionError> {
    names
        .first()
        .cloned()
        .ok_or_else(|| VisionError::ModelLoad(format!("{:?} declares no outputs", path)))
}

/// Loads `.onnx` artifacts with ONNX Runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelBackend>, VisionError> {
        Ok(Box::new(OnnxModel::load(path)?))
    }
}

/// ONNX Runtime session with a resolved input signature.
pub struct OnnxModel {
    // The runtime needs exclusive access per run; weights stay read-only.
    session: Mutex<Session>,
    output_name: String,
    spec: InputSpec,
    format: InputFormat,
}

impl OnnxModel {
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| VisionError::ModelLoad(format!("Failed to load {:?}: {}", path, e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| VisionError::ModelLoad(format!("{:?} declares no inputs", path)))?;
        let shape: Vec<i64> = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            _ => return Err(VisionError::ModelLoad(format!("First input of {:?} is not a tensor", path))),
        };

        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();
        let output_name = score_output(&output_names, path)?;

        let (format, height, width) = InputFormat::resolve(&shape)?;
        let spec = InputSpec::new(width, height, format.layout(), ChannelOrder::Rgb)?;
        info!("ONNX model {:?}: input {:?} resolved as {:?} {}x{}", path, shape, format, width, height);

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            spec,
            format,
        })
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }
}

impl ModelBackend for OnnxModel {
    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn forward(&self, input: &ModelInput) -> Result<Vec<f32>, VisionError> {
        let tensor = Tensor::from_array((input.shape, input.data.clone()))
            .map_err(|e| VisionError::Inference(format!("Failed to build input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Inference(format!("Forward pass failed: {}", e)))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| VisionError::Inference(format!("Model produced no output {:?}", self.output_name)))?;
        let (_, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Inference(format!("Failed to read model output: {}", e)))?;

        Ok(scores.to_vec())
    }
}
