//! Tests for loading configuration from disk

use sortline_eye::config::{VisionConfig, DEFAULT_SOURCE};
use sortline_eye::VisionError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sortline.toml");
    fs::write(
        &path,
        r#"
source = "rtsp://10.0.0.5:8554/line2"
log_level = "debug"

[capture]
buffer_size = 2
resolution = [1280, 720]

[capture.camera]
auto_exposure = true
exposure = -40.0

[model]
model_path = "/opt/sortline/fish.onnx"
labels_path = "/opt/sortline/fish.txt"
confidence_threshold = 0.75

[stability]
window_secs = 0.5

[pipeline]
poll_interval_ms = 30
"#,
    )
    .unwrap();

    let config = VisionConfig::from_file(&path).unwrap();
    assert_eq!(config.source, "rtsp://10.0.0.5:8554/line2");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.capture.buffer_size, 2);
    assert_eq!(config.capture.resolution, Some((1280, 720)));
    assert!(config.capture.camera.auto_exposure);
    assert_eq!(config.capture.camera.exposure, Some(-40.0));
    assert_eq!(config.model.model_path, PathBuf::from("/opt/sortline/fish.onnx"));
    assert_eq!(config.model.confidence_threshold, 0.75);
    assert_eq!(config.stability.window_secs, 0.5);
    assert_eq!(config.pipeline.poll_interval_ms, 30);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sortline.json");
    fs::write(&path, r#"{"model": {"confidence_threshold": 0.6}}"#).unwrap();

    let config = VisionConfig::from_file(&path).unwrap();
    assert_eq!(config.source, DEFAULT_SOURCE);
    assert_eq!(config.model.confidence_threshold, 0.6);
}

#[test]
fn test_invalid_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[model\nconfidence_threshold = ").unwrap();

    assert!(matches!(VisionConfig::from_file(&path), Err(VisionError::Config(_))));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = VisionConfig::from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(VisionError::Config(_))));
}

#[test]
fn test_out_of_range_file_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sortline.toml");
    fs::write(&path, "[model]\nconfidence_threshold = 1.5\n").unwrap();

    let config = VisionConfig::from_file(&path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_default_config_round_trips_through_toml() {
    let rendered = toml::to_string_pretty(&VisionConfig::default()).unwrap();
    let parsed = VisionConfig::from_str(&rendered).unwrap();
    assert_eq!(parsed, VisionConfig::default());
}
