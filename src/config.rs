// SPDX-License-Identifier: GPL-3.0-only

//! Persistent controller settings
//!
//! Stored as JSON under the platform config directory. Unknown or missing
//! fields fall back to their defaults so older files keep loading.

use crate::backends::camera::types::{AspectRatio, FlashMode, FocusMode, LensFacing, Size};
use crate::constants::{BitratePreset, DEFAULT_SAVE_FOLDER, limits, recording, timing};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory name under the platform config directory
pub const CONFIG_DIR: &str = "camera-session";

/// Settings file name
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lens opened when none is requested
    pub facing: LensFacing,
    /// Requested preview/still/video aspect ratio
    pub aspect_ratio: AspectRatio,
    pub flash_mode: FlashMode,
    /// Auto-focus enabled (when the lens supports it)
    pub focus_mode: FocusMode,
    /// Bounded wait for the open/close lock
    pub open_lock_timeout_ms: u64,
    /// Longest wait for focus/exposure convergence before a still
    pub focus_timeout_ms: u64,
    /// How long a tap-to-focus point is held
    pub focus_hold_ms: u64,
    /// Largest preview size requested from the device
    pub max_preview: Size,
    /// Hardware encoder ceiling
    pub video_ceiling: Size,
    /// Size of the preview view, used to pick a preview resolution
    pub view_size: Size,
    /// Size of the display the view lives on
    pub display_size: Size,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    pub video_framerate: u32,
    /// Record microphone audio with video
    pub audio_enabled: bool,
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facing: LensFacing::default(),
            aspect_ratio: AspectRatio::default(),
            flash_mode: FlashMode::default(),
            focus_mode: FocusMode::default(),
            open_lock_timeout_ms: timing::OPEN_LOCK_TIMEOUT.as_millis() as u64,
            focus_timeout_ms: timing::FOCUS_TIMEOUT.as_millis() as u64,
            focus_hold_ms: timing::FOCUS_HOLD.as_millis() as u64,
            max_preview: limits::MAX_PREVIEW,
            video_ceiling: limits::VIDEO_CEILING,
            view_size: Size::new(1080, 1920),
            display_size: Size::new(1080, 1920),
            bitrate_preset: BitratePreset::default(),
            video_framerate: recording::DEFAULT_FRAMERATE,
            audio_enabled: true,
            photo_dir: default_photo_dir(),
            video_dir: default_video_dir(),
        }
    }
}

impl Config {
    /// Default settings file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    /// Read settings from `path`
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(AppError::Storage(format!("{}: {}", path.display(), e))),
        };

        serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Write settings to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn open_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.open_lock_timeout_ms)
    }

    pub fn focus_timeout(&self) -> Duration {
        Duration::from_millis(self.focus_timeout_ms)
    }

    pub fn focus_hold(&self) -> Duration {
        Duration::from_millis(self.focus_hold_ms)
    }
}

/// Platform picture directory joined with the save folder
pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Platform video directory joined with the save folder
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
