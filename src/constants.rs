// SPDX-License-Identifier: GPL-3.0-only

//! Controller-wide constants

use crate::backends::camera::types::Size;
use serde::{Deserialize, Serialize};

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbps for a recording of `size`
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, size: Size) -> u32 {
        match (ResolutionTier::for_width(size.width), self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }
}

impl std::str::FromStr for BitratePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(BitratePreset::Low),
            "medium" => Ok(BitratePreset::Medium),
            "high" => Ok(BitratePreset::High),
            other => Err(format!("unknown bitrate preset {:?}", other)),
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// SD: 640x480 and below
    SD,
    /// HD: 1280x720
    HD,
    /// Full HD: 1920x1080
    FullHD,
    /// 4K: 3840x2160 and above
    FourK,
}

impl ResolutionTier {
    pub fn for_width(width: u32) -> Self {
        match width {
            w if w >= 3840 => ResolutionTier::FourK,
            w if w >= 1920 => ResolutionTier::FullHD,
            w if w >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Output size limits
pub mod limits {
    use crate::backends::camera::types::Size;

    /// Largest preview the device is asked for
    pub const MAX_PREVIEW: Size = Size::new(1920, 1080);

    /// Hardware encoder ceiling for the recorder surface
    pub const VIDEO_CEILING: Size = Size::new(1920, 1080);

    /// Still buffers the consumer may hold before the device stalls
    pub const STILL_MAX_IMAGES: usize = 2;

    /// Frame channel depth for recorder surfaces
    pub const RECORDER_QUEUE: usize = 8;
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Bounded wait for the open/close lock
    pub const OPEN_LOCK_TIMEOUT: Duration = Duration::from_millis(2500);

    /// Longest wait for AF/AE convergence before taking the still anyway
    pub const FOCUS_TIMEOUT: Duration = Duration::from_millis(800);

    /// How long a tap-to-focus point is held before continuous AF resumes
    pub const FOCUS_HOLD: Duration = Duration::from_millis(3000);
}

/// Recording defaults
pub mod recording {
    /// Frame rate requested from the video sink
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Container extension written by the file video sink
    pub const VIDEO_EXTENSION: &str = "mp4";
}

/// Folder appended to the platform picture and video directories
pub const DEFAULT_SAVE_FOLDER: &str = "camera";

/// Capacity of the controller's command and event channels
pub const CHANNEL_CAPACITY: usize = 32;
