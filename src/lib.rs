// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture session controller
//!
//! Drives a single asynchronous, session-oriented camera device: opening and
//! closing it under an exclusive lock, picking preview/video/still sizes,
//! running the focus and exposure sequence for stills, and swapping the
//! session for video recording.
//!
//! # Architecture
//!
//! - [`backends`]: the `CaptureDevice` trait and a virtual device
//! - [`session`]: the controller and the pure helpers it is built from
//! - [`pipelines`]: still and video sinks
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```no_run
//! use camera_session::backends::camera::VirtualDevice;
//! use camera_session::pipelines::{photo::FileStillSink, video::FileVideoSink};
//! use camera_session::session::{CameraController, ControllerOptions};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), camera_session::errors::ControllerError> {
//! let controller = CameraController::spawn(
//!     Arc::new(VirtualDevice::new()),
//!     Arc::new(FileStillSink::new("/tmp/photos")),
//!     Box::new(FileVideoSink::new()),
//!     ControllerOptions::default(),
//! )?;
//! let status = controller.status();
//! controller.open(status.aspect_ratio, status.facing).await?;
//! controller.take_still().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, ControllerError, ControllerResult};
pub use session::{CameraController, ControllerEvent, ControllerOptions, ControllerStatus};
