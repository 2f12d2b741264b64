// SPDX-License-Identifier: GPL-3.0-only

//! Output sinks fed by the capture session controller
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Still surface│ ──▶ │    StillSink      │ ──▶ │  JPEG file   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │Recorder surf.│ ──▶ │    VideoSink      │ ──▶ │   MP4 file   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! The controller only depends on the traits; the file-backed sinks here are
//! the defaults used by the command-line front end.
//!
//! - [`photo`]: still delivery
//! - [`video`]: recorder preparation, start/stop and finalization

pub mod photo;
pub mod video;
