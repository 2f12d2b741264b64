// SPDX-License-Identifier: GPL-3.0-only

//! Video recording output
//!
//! A recording goes through `prepare → start → stop → finalize | discard →
//! release`. The controller binds the surface returned by `prepare` into the
//! recording session and calls `start` only once that session is configured.

pub mod recorder;

pub use recorder::FileVideoSink;

use crate::backends::camera::types::{Size, Surface};
use crate::errors::RecordingResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Where recorded audio comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// Video only
    None,
    Microphone,
}

/// Where recorded video comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    /// Frames the device writes into the recorder surface
    Surface,
}

/// Everything a video sink needs to set up an encoder
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSinkConfig {
    pub size: Size,
    pub output_path: PathBuf,
    /// Clockwise rotation players should apply
    pub orientation_hint: u32,
    pub audio_source: AudioSource,
    pub video_source: VideoSource,
    pub bitrate_kbps: u32,
    pub framerate: u32,
}

/// Consumer of recorder frames
#[async_trait]
pub trait VideoSink: Send {
    /// Allocate the encoder and output, returning the surface to record into
    async fn prepare(&mut self, config: &VideoSinkConfig) -> RecordingResult<Surface>;

    /// Begin consuming frames
    async fn start(&mut self) -> RecordingResult<()>;

    /// Stop consuming frames, returning the number of bytes written
    async fn stop(&mut self) -> RecordingResult<u64>;

    /// Keep the output and return where it ended up
    async fn finalize(&mut self) -> RecordingResult<PathBuf>;

    /// Delete the output
    async fn discard(&mut self);

    /// Free the encoder and surface
    async fn release(&mut self);
}
