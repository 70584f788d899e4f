//! Frame to model input conversion

use crate::error::VisionError;
use crate::frame::{ChannelOrder, Frame};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Memory layout of the single-item input batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorLayout {
    /// `[1, H, W, C]`
    Nhwc,
    /// `[1, C, H, W]`
    Nchw,
}

impl TensorLayout {
    pub fn shape(self, height: u32, width: u32, channels: usize) -> [usize; 4] {
        match self {
            TensorLayout::Nhwc => [1, height as usize, width as usize, channels],
            TensorLayout::Nchw => [1, channels, height as usize, width as usize],
        }
    }
}

/// Input expected by a loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
    /// `Rgb` or `Bgr`
    pub channel_order: ChannelOrder,
}

impl InputSpec {
    pub fn new(width: u32, height: u32, layout: TensorLayout, channel_order: ChannelOrder) -> Result<Self, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::ModelLoad(format!("Invalid model input size {}x{}", width, height)));
        }
        if width > 4096 || height > 4096 {
            return Err(VisionError::ModelLoad(format!("Model input size {}x{} too large", width, height)));
        }
        if !matches!(channel_order, ChannelOrder::Rgb | ChannelOrder::Bgr) {
            return Err(VisionError::ModelLoad(format!("Unsupported model channel order {:?}", channel_order)));
        }
        Ok(Self {
            width,
            height,
            layout,
            channel_order,
        })
    }
}

/// A single-item batch of `f32` pixel intensities in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
    pub layout: TensorLayout,
}

/// Decode a frame of any channel order into an RGB image.
fn to_rgb_image(frame: &Frame) -> RgbImage {
    let width = frame.width();
    let channels = frame.order().channels();
    let data = frame.data();
    let order = frame.order();

    RgbImage::from_fn(width, frame.height(), |x, y| {
        let offset = (y as usize * width as usize + x as usize) * channels;
        Rgb(order.to_rgb(&data[offset..offset + channels]))
    })
}

/// Resize to the model resolution, reorder channels, scale to `[0, 1]` and
/// lay out as a single-item batch.
pub fn preprocess(frame: &Frame, spec: &InputSpec) -> Result<ModelInput, VisionError> {
    if frame.is_empty() {
        return Err(VisionError::InvalidFrame(format!(
            "Cannot classify a {}x{} frame",
            frame.width(),
            frame.height()
        )));
    }

    let rgb = to_rgb_image(frame);
    let resized = if rgb.width() == spec.width && rgb.height() == spec.height {
        rgb
    } else {
        imageops::resize(&rgb, spec.width, spec.height, FilterType::Triangle)
    };

    let (width, height) = (spec.width as usize, spec.height as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; plane * 3];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let values = match spec.channel_order {
            ChannelOrder::Bgr => [b, g, r],
            _ => [r, g, b],
        };
        let position = y as usize * width + x as usize;
        for (channel, value) in values.iter().enumerate() {
            let index = match spec.layout {
                TensorLayout::Nhwc => position * 3 + channel,
                TensorLayout::Nchw => channel * plane + position,
            };
            data[index] = *value as f32 / 255.0;
        }
    }

    Ok(ModelInput {
        data,
        shape: spec.layout.shape(spec.height, spec.width, 3),
        layout: spec.layout,
    })
}
