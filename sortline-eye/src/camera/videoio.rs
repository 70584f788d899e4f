//! OpenCV video I/O capture backend

use super::{CaptureBackend, CaptureDevice, CaptureOptions, SourceId};
use crate::error::VisionError;
use crate::frame::{ChannelOrder, Frame};
use opencv::{
    core::{Mat, CV_8U},
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, info, warn};

/// Opens device indices, files and network streams through OpenCV.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl CaptureBackend for OpenCvBackend {
    fn open(&self, source: &SourceId, options: &CaptureOptions) -> Result<Box<dyn CaptureDevice>, VisionError> {
        let mut capture = open_capture(source)?;
        configure(&mut capture, options);
        Ok(Box::new(OpenCvDevice {
            source: source.clone(),
            options: options.clone(),
            capture: Some(capture),
            frame: Mat::default(),
        }))
    }
}

fn open_capture(source: &SourceId) -> Result<VideoCapture, VisionError> {
    let capture = match source {
        SourceId::Device(index) => VideoCapture::new(*index as i32, videoio::CAP_ANY),
        SourceId::Path(path) => VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY),
        SourceId::Stream(uri) => VideoCapture::from_file(uri, videoio::CAP_FFMPEG),
    }
    .map_err(|e| VisionError::SourceUnavailable(format!("Failed to open {}: {}", source, e)))?;

    let opened = capture
        .is_opened()
        .map_err(|e| VisionError::SourceUnavailable(format!("{} not opened: {}", source, e)))?;
    if !opened {
        return Err(VisionError::SourceUnavailable(format!("{} failed to open", source)));
    }

    Ok(capture)
}

fn configure(capture: &mut VideoCapture, options: &CaptureOptions) {
    let mut props = vec![(videoio::CAP_PROP_BUFFERSIZE, "buffer size", options.buffer_size as f64)];

    if let Some((width, height)) = options.resolution {
        props.push((videoio::CAP_PROP_FRAME_WIDTH, "width", width as f64));
        props.push((videoio::CAP_PROP_FRAME_HEIGHT, "height", height as f64));
    }
    if let Some(fps) = options.fps {
        props.push((videoio::CAP_PROP_FPS, "fps", fps));
    }

    let camera = &options.camera;
    // V4L2 convention: 3 = aperture priority (auto), 1 = manual
    props.push((
        videoio::CAP_PROP_AUTO_EXPOSURE,
        "auto exposure",
        if camera.auto_exposure { 3.0 } else { 1.0 },
    ));
    let controls = [
        (videoio::CAP_PROP_BRIGHTNESS, "brightness", camera.brightness),
        (videoio::CAP_PROP_EXPOSURE, "exposure", camera.exposure),
        (videoio::CAP_PROP_CONTRAST, "contrast", camera.contrast),
        (videoio::CAP_PROP_GAIN, "gain", camera.gain),
        (videoio::CAP_PROP_HUE, "hue", camera.hue),
    ];
    for (prop, name, value) in controls {
        if let Some(value) = value {
            props.push((prop, name, value));
        }
    }

    for (prop, name, value) in props {
        match capture.set(prop, value) {
            Ok(true) => debug!("Capture property {} set to {}", name, value),
            Ok(false) => debug!("Capture property {} not supported by backend", name),
            Err(e) => warn!("Failed to set capture property {}: {}", name, e),
        }
    }
}

/// Copy an 8-bit OpenCV image into an owned frame.
fn mat_to_frame(mat: &Mat) -> Result<Frame, VisionError> {
    if mat.depth() != CV_8U {
        return Err(VisionError::InvalidFrame(format!("Unsupported Mat depth {}", mat.depth())));
    }

    let order = match mat.channels() {
        1 => ChannelOrder::Gray,
        3 => ChannelOrder::Bgr,
        4 => ChannelOrder::Bgra,
        n => return Err(VisionError::InvalidFrame(format!("Unsupported channel count {}", n))),
    };

    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        let owned = mat.try_clone()?;
        owned.data_bytes()?.to_vec()
    };

    Frame::new(mat.cols() as u32, mat.rows() as u32, order, data)
}

struct OpenCvDevice {
    source: SourceId,
    options: CaptureOptions,
    capture: Option<VideoCapture>,
    frame: Mat,
}

impl CaptureDevice for OpenCvDevice {
    fn grab(&mut self) -> Result<Frame, VisionError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| VisionError::Capture(format!("{} is not open", self.source)))?;

        let grabbed = capture.read(&mut self.frame)?;
        if !grabbed || self.frame.rows() <= 0 || self.frame.cols() <= 0 {
            return Err(VisionError::Capture(format!("No frame from {}", self.source)));
        }

        mat_to_frame(&self.frame)
    }

    fn reconnect(&mut self) -> Result<(), VisionError> {
        CaptureDevice::release(self);
        let mut capture = open_capture(&self.source)?;
        configure(&mut capture, &self.options);
        self.capture = Some(capture);
        info!("Reconnected to {}", self.source);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Failed to release {}: {}", self.source, e);
            } else {
                info!("Released capture device {}", self.source);
            }
        }
    }
}

impl Drop for OpenCvDevice {
    fn drop(&mut self) {
        CaptureDevice::release(self);
    }
}
