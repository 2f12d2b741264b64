// SPDX-License-Identifier: GPL-3.0-only

//! Capture device abstraction
//!
//! The controller drives exactly one asynchronous, session-oriented device.
//! Every hardware call here only *issues* an operation; its outcome comes back
//! later as a [`DeviceEvent`] on the channel the controller handed to `open`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ CameraController (handle)│  ← caller-facing async API
//! └────────────┬─────────────┘
//!              │ commands
//!              ▼
//! ┌──────────────────────────┐
//! │   controller worker      │  ← single task, owns handle/session/state
//! └──────┬─────────────▲─────┘
//!        │ calls       │ DeviceEvent
//!        ▼             │
//! ┌──────────────────────────┐
//! │   CaptureDevice trait    │  ← hardware seam
//! └────────────┬─────────────┘
//!              ▼
//!       ┌──────────────┐
//!       │VirtualDevice │  ← scripted in-process implementation
//!       └──────────────┘
//! ```

pub mod types;
pub mod virtual_device;

pub use types::*;
pub use virtual_device::{OpenFailure, VirtualBehavior, VirtualCall, VirtualDevice};

use crate::session::request::CaptureRequest;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque handle to an opened camera
///
/// Not `Clone`: the controller owns it exclusively and gives it back to the
/// device on close.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    id: Uuid,
    camera_id: String,
}

impl DeviceHandle {
    /// Mint a handle. Only device implementations should call this.
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            camera_id: camera_id.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }
}

/// Why a device stopped being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    /// Another client took the camera or it was unplugged
    Disconnected,
    /// Hardware or camera service failure with a driver error code
    Error(i32),
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFault::Disconnected => write!(f, "camera disconnected"),
            DeviceFault::Error(code) => write!(f, "camera error {}", code),
        }
    }
}

/// Callbacks from the device, delivered to the controller worker
#[derive(Debug)]
pub enum DeviceEvent {
    /// `open` finished; ownership of the handle moves to the receiver
    DeviceOpened {
        camera_id: String,
        handle: DeviceHandle,
    },
    /// `open` failed, or an open device hit a fatal fault
    DeviceError {
        camera_id: String,
        fault: DeviceFault,
    },
    SessionConfigured {
        session: Uuid,
    },
    SessionConfigFailed {
        session: Uuid,
        reason: String,
    },
    /// Partial result for an in-flight request
    CaptureProgressed {
        session: Uuid,
        request: Uuid,
        metadata: FrameMetadata,
    },
    CaptureCompleted {
        session: Uuid,
        request: Uuid,
        metadata: FrameMetadata,
    },
    CaptureFailed {
        session: Uuid,
        request: Uuid,
        reason: String,
    },
    /// A buffer landed on a still surface
    ImageAvailable {
        session: Uuid,
        surface: Uuid,
        frame: CameraFrame,
    },
}

impl DeviceEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::DeviceOpened { .. } => "DeviceOpened",
            DeviceEvent::DeviceError { .. } => "DeviceError",
            DeviceEvent::SessionConfigured { .. } => "SessionConfigured",
            DeviceEvent::SessionConfigFailed { .. } => "SessionConfigFailed",
            DeviceEvent::CaptureProgressed { .. } => "CaptureProgressed",
            DeviceEvent::CaptureCompleted { .. } => "CaptureCompleted",
            DeviceEvent::CaptureFailed { .. } => "CaptureFailed",
            DeviceEvent::ImageAvailable { .. } => "ImageAvailable",
        }
    }
}

/// Sender half of the device callback channel
pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// Receiver half of the device callback channel
pub type DeviceEventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

/// Asynchronous session-oriented capture device
///
/// Methods return `Err` only for failures detected synchronously (bad
/// arguments, stale session, camera missing). Everything else is reported
/// through the event channel.
pub trait CaptureDevice: Send + Sync {
    /// Describe every camera the device exposes
    fn cameras(&self) -> BackendResult<Vec<CameraCharacteristics>>;

    /// Start opening a camera. Completion arrives as `DeviceOpened` or `DeviceError`.
    fn open(&self, camera_id: &str, events: DeviceEventSender) -> BackendResult<()>;

    /// Close a camera. Any session on it becomes invalid.
    fn close(&self, handle: DeviceHandle);

    /// Bind a new session to `targets`. Any previous session on the handle is
    /// invalidated. Completion arrives as `SessionConfigured`/`SessionConfigFailed`.
    fn create_session(
        &self,
        handle: &DeviceHandle,
        session: Uuid,
        targets: &[Surface],
    ) -> BackendResult<()>;

    /// Tear down a session. Unknown or already-closed sessions are ignored.
    fn close_session(&self, session: Uuid);

    /// Replace the repeating request of a session
    fn set_repeating(&self, session: Uuid, request: &CaptureRequest) -> BackendResult<()>;

    /// Halt the repeating request of a session
    fn stop_repeating(&self, session: Uuid) -> BackendResult<()>;

    /// Submit a one-shot request; results arrive tagged with `request.id`
    fn capture(&self, session: Uuid, request: &CaptureRequest) -> BackendResult<()>;
}
