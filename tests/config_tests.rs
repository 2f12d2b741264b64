// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_session::backends::camera::types::{AspectRatio, FlashMode, FocusMode, LensFacing, Size};
use camera_session::session::ControllerOptions;
use camera_session::{AppError, BitratePreset, Config};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.facing, LensFacing::Back);
    assert_eq!(config.aspect_ratio, AspectRatio::DEFAULT);
    assert_eq!(config.flash_mode, FlashMode::Auto);
    assert_eq!(config.focus_mode, FocusMode::Auto);
    assert_eq!(config.open_lock_timeout(), Duration::from_millis(2500));
    assert_eq!(config.focus_timeout(), Duration::from_millis(800));
    assert_eq!(config.focus_hold(), Duration::from_millis(3000));
    assert_eq!(config.max_preview, Size::new(1920, 1080));
    assert_eq!(config.video_ceiling, Size::new(1920, 1080));
    assert_eq!(config.video_framerate, 30);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        facing: LensFacing::Front,
        aspect_ratio: AspectRatio::WIDE,
        flash_mode: FlashMode::Torch,
        bitrate_preset: BitratePreset::High,
        ..Config::default()
    };
    config.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"16:9\""), "{}", text);
    assert_eq!(Config::load(&path).unwrap(), config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "facing": "front", "focus_timeout_ms": 1200 }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.facing, LensFacing::Front);
    assert_eq!(config.focus_timeout(), Duration::from_millis(1200));
    assert_eq!(config.focus_hold_ms, Config::default().focus_hold_ms);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Config::load(&path), Err(AppError::Config(_))));
}

#[test]
fn test_options_follow_config() {
    let config = Config {
        focus_timeout_ms: 500,
        audio_enabled: false,
        ..Config::default()
    };
    let options = ControllerOptions::from(&config);

    assert_eq!(options.focus_timeout, Duration::from_millis(500));
    assert!(!options.audio_enabled);
    assert_eq!(options.video_dir, config.video_dir);
}
