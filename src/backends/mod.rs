// SPDX-License-Identifier: GPL-3.0-only

//! Hardware backends
//!
//! - [`camera`]: the capture device seam and its virtual implementation

pub mod camera;
