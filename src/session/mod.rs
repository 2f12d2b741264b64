// SPDX-License-Identifier: GPL-3.0-only

//! Capture session control
//!
//! [`CameraController`] is the entry point. It owns one camera device, keeps
//! at most one capture session bound to it, and runs the still, recording and
//! tap-to-focus sequences on top of that session.
//!
//! The remaining modules are the pure pieces the controller is built from:
//! size selection, orientation math, request building, the focus/exposure
//! transition function and metering regions.

pub mod controller;
pub mod focus;
pub mod lock;
pub mod metering;
pub mod orientation;
pub mod request;
pub mod sizes;
mod worker;

pub use controller::{
    CameraController, ControllerEvent, ControllerOptions, ControllerStatus, DeviceState,
};
pub use focus::CaptureState;
pub use lock::{DeviceLock, DevicePermit, LockTimeout};
pub use sizes::{ResolutionTriple, SizeWarning};
