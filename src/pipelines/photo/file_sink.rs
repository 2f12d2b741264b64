// SPDX-License-Identifier: GPL-3.0-only

//! Write stills to a directory as timestamped JPEG files

use super::StillSink;
use crate::backends::camera::types::{CameraFrame, PixelFormat};
use crate::errors::{PhotoError, PhotoResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Saves each delivered still as `photo_YYYYmmdd_HHMMSS_mmm.jpg`
#[derive(Debug, Clone)]
pub struct FileStillSink {
    output_dir: PathBuf,
}

impl FileStillSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn next_path(&self) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        self.output_dir.join(format!("photo_{}.jpg", timestamp))
    }
}

#[async_trait]
impl StillSink for FileStillSink {
    async fn deliver(&self, frame: CameraFrame, rotation: u32) -> PhotoResult<PathBuf> {
        if frame.data.is_empty() {
            return Err(PhotoError::NoFrameAvailable);
        }
        if frame.format != PixelFormat::Jpeg {
            return Err(PhotoError::CaptureFailed(format!(
                "expected a JPEG buffer, got {:?}",
                frame.format
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.next_path();
        tokio::fs::write(&path, frame.data.as_ref())
            .await
            .map_err(|e| PhotoError::SaveFailed(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            width = frame.width,
            height = frame.height,
            rotation,
            bytes = frame.data.len(),
            "Photo saved"
        );
        Ok(path)
    }
}
