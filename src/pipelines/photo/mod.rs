// SPDX-License-Identifier: GPL-3.0-only

//! Still image output
//!
//! ```text
//! ImageAvailable → StillSink::deliver → Disk I/O
//!       ↓
//! Preview resumes without waiting for the write
//! ```
//!
//! Delivery runs on its own task, so a slow sink never holds up the
//! controller's callback handling.

pub mod file_sink;

pub use file_sink::FileStillSink;

use crate::backends::camera::types::{CameraFrame, Size, Surface, SurfaceKind};
use crate::constants::limits::STILL_MAX_IMAGES;
use crate::errors::PhotoResult;
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Consumer of finished stills
#[async_trait]
pub trait StillSink: Send + Sync {
    /// Surface the device should write stills of `size` into
    fn acquire_target(&self, size: Size) -> Surface {
        Surface::new(SurfaceKind::Still, size).with_max_images(STILL_MAX_IMAGES)
    }

    /// Take ownership of one captured buffer
    ///
    /// `rotation` is the clockwise rotation the image should be displayed with.
    async fn deliver(&self, frame: CameraFrame, rotation: u32) -> PhotoResult<PathBuf>;

    /// The surface from `acquire_target` is no longer bound to any session
    fn release_target(&self, _surface: Uuid) {}
}
