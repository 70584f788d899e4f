//! Configuration for sortline-eye

use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default stream of the sorting line camera.
pub const DEFAULT_SOURCE: &str = "rtsp://192.168.100.10:8554/mystream";

/// Manual camera controls from the operator settings dialog.
///
/// Values are on the dialog's -100..=100 scale; `None` leaves the device default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraControls {
    pub brightness: Option<f64>,
    pub exposure: Option<f64>,
    pub contrast: Option<f64>,
    pub gain: Option<f64>,
    pub hue: Option<f64>,
    pub auto_exposure: bool,
}

impl CameraControls {
    fn validate(&self) -> Result<(), String> {
        let controls = [
            ("brightness", self.brightness),
            ("exposure", self.exposure),
            ("contrast", self.contrast),
            ("gain", self.gain),
            ("hue", self.hue),
        ];
        for (name, value) in controls {
            if let Some(v) = value {
                if !v.is_finite() || !(-100.0..=100.0).contains(&v) {
                    return Err(format!("Camera {} must be between -100 and 100", name));
                }
            }
        }
        Ok(())
    }
}

/// Capture device options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Driver-side frame buffer depth; 1 favours recency over completeness
    pub buffer_size: u32,
    /// Requested resolution (width, height)
    pub resolution: Option<(u32, u32)>,
    /// Requested frame rate
    pub fps: Option<f64>,
    /// First delay after a failed capture
    pub retry_backoff_ms: u64,
    /// Upper bound for the exponential retry delay
    pub max_backoff_ms: u64,
    /// Consecutive failures before the device is reopened (0 disables)
    pub reconnect_after: u32,
    pub camera: CameraControls,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            resolution: None,
            fps: None,
            camera: CameraControls::default(),
            retry_backoff_ms: 10,
            max_backoff_ms: 500,
            reconnect_after: 30,
        }
    }
}

impl CaptureOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size == 0 {
            return Err("Capture buffer size must be at least 1".to_string());
        }
        if let Some((w, h)) = self.resolution {
            if w == 0 || h == 0 {
                return Err("Resolution must be non-zero".to_string());
            }
            if w > 7680 || h > 4320 {
                return Err("Resolution too large (max 8K)".to_string());
            }
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 || fps > 240.0 {
                return Err("Frame rate must be between 0 and 240".to_string());
            }
        }
        if self.retry_backoff_ms > self.max_backoff_ms {
            return Err("Initial retry backoff exceeds the maximum backoff".to_string());
        }
        self.camera.validate()
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let delay = self.retry_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Classifier artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    /// Minimum probability for a sample to count toward stabilization
    pub confidence_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("data/model.onnx"),
            labels_path: PathBuf::from("data/labels.txt"),
            confidence_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Continuous qualification time before a detection is trusted
    pub window_secs: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self { window_secs: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between detection iterations
    pub poll_interval_ms: u64,
    /// Log every classification at debug level
    pub log_results: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 17,
            log_results: false,
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Detection core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Device index, file path or stream URI
    pub source: String,
    pub log_level: String,
    pub capture: CaptureOptions,
    pub model: ModelConfig,
    pub stability: StabilityConfig,
    pub pipeline: PipelineConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            capture: CaptureOptions::default(),
            model: ModelConfig::default(),
            stability: StabilityConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl VisionConfig {
    /// Load configuration from a TOML or JSON file
    pub fn from_file(path: &Path) -> Result<Self, VisionError> {
        let content = fs::read_to_string(path)
            .map_err(|e| VisionError::Config(format!("Failed to read {:?}: {}", path, e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| VisionError::Config(format!("Invalid TOML in {:?}: {}", path, e))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| VisionError::Config(format!("Invalid JSON in {:?}: {}", path, e))),
            _ => Self::from_str(&content),
        }
    }

    /// Parse configuration, trying JSON first and then TOML
    pub fn from_str(content: &str) -> Result<Self, VisionError> {
        if let Ok(config) = serde_json::from_str::<VisionConfig>(content) {
            return Ok(config);
        }
        toml::from_str::<VisionConfig>(content)
            .map_err(|e| VisionError::Config(format!("Unknown config format: {}", e)))
    }

    /// Apply `SORTLINE_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), VisionError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), VisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup("SORTLINE_SOURCE") {
            self.source = source;
        }
        if let Some(path) = lookup("SORTLINE_MODEL_PATH") {
            self.model.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SORTLINE_LABELS_PATH") {
            self.model.labels_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("SORTLINE_CONFIDENCE_THRESHOLD") {
            self.model.confidence_threshold = raw.trim().parse().map_err(|_| {
                VisionError::Config(format!("SORTLINE_CONFIDENCE_THRESHOLD is not a number: {:?}", raw))
            })?;
        }
        if let Some(raw) = lookup("SORTLINE_STABILITY_WINDOW") {
            self.stability.window_secs = raw.trim().parse().map_err(|_| {
                VisionError::Config(format!("SORTLINE_STABILITY_WINDOW is not a number: {:?}", raw))
            })?;
        }
        if let Some(level) = lookup("SORTLINE_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        self.check().map_err(VisionError::Config)
    }

    fn check(&self) -> Result<(), String> {
        if self.source.trim().is_empty() {
            return Err("Frame source must not be empty".to_string());
        }

        let threshold = self.model.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err("Confidence threshold must be between 0 and 1".to_string());
        }

        let window = self.stability.window_secs;
        if !window.is_finite() || window < 0.0 {
            return Err("Stabilization window must be a non-negative number of seconds".to_string());
        }

        if self.pipeline.poll_interval_ms > 10_000 {
            return Err("Poll interval too large (max 10s)".to_string());
        }

        self.capture.validate()
    }
}
