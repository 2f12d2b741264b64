// SPDX-License-Identifier: GPL-3.0-only

//! Capture session controller
//!
//! [`CameraController`] is a cheap, cloneable handle. Every method sends a
//! command to a single worker task and returns once the worker has accepted
//! or rejected it; outcomes that complete later (device opened, photo saved,
//! recording finished) arrive as [`ControllerEvent`]s.
//!
//! Open, close and reconfigure take the [`DeviceLock`] on the caller's side
//! with a bounded wait before the command is sent. The permit travels with
//! the command, so the worker releases it exactly where the operation ends.

use super::focus::CaptureState;
use super::lock::{DeviceLock, DevicePermit};
use super::sizes::{ResolutionTriple, SizeWarning};
use super::worker::{Shared, Worker};
use crate::backends::camera::types::{
    AspectRatio, DisplayRotation, FlashMode, FocusMode, LensFacing, Size,
};
use crate::backends::camera::CaptureDevice;
use crate::config::Config;
use crate::constants::{BitratePreset, CHANNEL_CAPACITY, limits, recording, timing};
use crate::errors::{ControllerError, ControllerResult, PhotoError};
use crate::pipelines::photo::StillSink;
use crate::pipelines::video::VideoSink;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of the device handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Closed,
    /// Open requested, waiting for the device callback
    Opening,
    Open,
}

/// Snapshot of the controller, republished after every command and callback
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerStatus {
    pub device: DeviceState,
    pub capture: CaptureState,
    pub camera_id: Option<String>,
    pub facing: LensFacing,
    pub aspect_ratio: AspectRatio,
    pub flash: FlashMode,
    pub focus: FocusMode,
    pub display_rotation: DisplayRotation,
    /// Current session, present exactly when a device handle is held
    pub session: Option<Uuid>,
    pub session_configured: bool,
    pub recording: bool,
    pub still_pending: bool,
    pub manual_focus: bool,
    pub resolutions: Option<ResolutionTriple>,
    pub size_warning: Option<SizeWarning>,
    pub supported_aspect_ratios: BTreeSet<AspectRatio>,
    pub flash_supported: bool,
    pub facing_switch_supported: bool,
}

impl ControllerStatus {
    pub fn has_handle(&self) -> bool {
        self.device == DeviceState::Open
    }
}

/// Outcomes reported by the worker
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Device opened and the preview session requested
    Opened {
        camera_id: String,
        resolutions: ResolutionTriple,
    },
    /// The preview session is configured and streaming
    PreviewStarted { session: Uuid },
    /// Preview fell back to a degraded size
    SizeWarning(SizeWarning),
    /// Device-level failure; the controller is closed
    DeviceError { error: ControllerError },
    Closed,
    /// AF/AE did not converge in time; the still is taken anyway
    FocusTimedOut,
    StillSaved { path: PathBuf },
    StillFailed { error: PhotoError },
    RecordingStarted { path: PathBuf },
    RecordingSaved { path: PathBuf, bytes: u64 },
    /// Stop produced nothing usable; the output was deleted
    RecordingDiscarded { reason: String },
    RecordingFailed { error: ControllerError },
}

/// Tunables for one controller instance
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub facing: LensFacing,
    pub aspect_ratio: AspectRatio,
    pub flash: FlashMode,
    pub focus: FocusMode,
    pub open_lock_timeout: Duration,
    pub focus_timeout: Duration,
    pub focus_hold: Duration,
    pub max_preview: Size,
    pub video_ceiling: Size,
    pub view_size: Size,
    pub display_size: Size,
    pub display_rotation: DisplayRotation,
    pub bitrate_preset: BitratePreset,
    pub video_framerate: u32,
    pub audio_enabled: bool,
    pub video_dir: PathBuf,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            facing: LensFacing::default(),
            aspect_ratio: AspectRatio::default(),
            flash: FlashMode::default(),
            focus: FocusMode::default(),
            open_lock_timeout: timing::OPEN_LOCK_TIMEOUT,
            focus_timeout: timing::FOCUS_TIMEOUT,
            focus_hold: timing::FOCUS_HOLD,
            max_preview: limits::MAX_PREVIEW,
            video_ceiling: limits::VIDEO_CEILING,
            view_size: Size::new(1080, 1920),
            display_size: Size::new(1080, 1920),
            display_rotation: DisplayRotation::default(),
            bitrate_preset: BitratePreset::default(),
            video_framerate: recording::DEFAULT_FRAMERATE,
            audio_enabled: true,
            video_dir: crate::config::default_video_dir(),
        }
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            facing: config.facing,
            aspect_ratio: config.aspect_ratio,
            flash: config.flash_mode,
            focus: config.focus_mode,
            open_lock_timeout: config.open_lock_timeout(),
            focus_timeout: config.focus_timeout(),
            focus_hold: config.focus_hold(),
            max_preview: config.max_preview,
            video_ceiling: config.video_ceiling,
            view_size: config.view_size,
            display_size: config.display_size,
            display_rotation: DisplayRotation::default(),
            bitrate_preset: config.bitrate_preset,
            video_framerate: config.video_framerate,
            audio_enabled: config.audio_enabled,
            video_dir: config.video_dir.clone(),
        }
    }
}

pub(crate) type Reply<T> = oneshot::Sender<ControllerResult<T>>;

pub(crate) enum Command {
    Open {
        aspect_ratio: AspectRatio,
        facing: LensFacing,
        permit: DevicePermit,
        reply: Reply<()>,
    },
    Close {
        permit: DevicePermit,
        reply: Reply<()>,
    },
    SetFacing {
        facing: LensFacing,
        permit: DevicePermit,
        reply: Reply<()>,
    },
    SetAspectRatio {
        ratio: AspectRatio,
        permit: DevicePermit,
        reply: Reply<bool>,
    },
    SetFlash {
        mode: FlashMode,
        reply: Reply<()>,
    },
    SetFocusMode {
        mode: FocusMode,
        reply: Reply<()>,
    },
    SetDisplayRotation {
        rotation: DisplayRotation,
        reply: Reply<()>,
    },
    SetViewSize {
        size: Size,
        reply: Reply<()>,
    },
    FocusAt {
        x: f32,
        y: f32,
        reply: Reply<()>,
    },
    TakeStill {
        reply: Reply<()>,
    },
    StartRecording {
        reply: Reply<()>,
    },
    StopRecording {
        reply: Reply<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Caller-facing handle to the capture session worker
#[derive(Clone)]
pub struct CameraController {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ControllerStatus>,
    events: broadcast::Sender<ControllerEvent>,
    recording: Arc<AtomicBool>,
    lock: DeviceLock,
    lock_timeout: Duration,
}

impl CameraController {
    /// Start the worker for `device`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        device: Arc<dyn CaptureDevice>,
        still_sink: Arc<dyn StillSink>,
        video_sink: Box<dyn VideoSink>,
        options: ControllerOptions,
    ) -> ControllerResult<Self> {
        let cameras = device.cameras()?;
        if cameras.is_empty() {
            return Err(ControllerError::DeviceFatal("no cameras available".into()));
        }

        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, _) = broadcast::channel(CHANNEL_CAPACITY * 2);
        let recording = Arc::new(AtomicBool::new(false));
        let lock = DeviceLock::new();
        let lock_timeout = options.open_lock_timeout;

        let (worker, device_rx, status_rx) = Worker::new(
            device,
            cameras,
            still_sink,
            video_sink,
            options,
            Shared {
                events: events_tx.clone(),
                recording: Arc::clone(&recording),
            },
        );
        tokio::spawn(worker.run(command_rx, device_rx));

        Ok(Self {
            commands: command_tx,
            status: status_rx,
            events: events_tx,
            recording,
            lock,
            lock_timeout,
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> ControllerResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ControllerError::WorkerStopped)?;
        response.await.map_err(|_| ControllerError::WorkerStopped)?
    }

    async fn acquire(&self, purpose: &'static str) -> ControllerResult<DevicePermit> {
        Ok(self.lock.acquire(self.lock_timeout, purpose).await?)
    }

    /// Open the camera facing `facing` with `aspect_ratio`
    ///
    /// Returns once the open is issued; watch for [`ControllerEvent::Opened`].
    pub async fn open(&self, aspect_ratio: AspectRatio, facing: LensFacing) -> ControllerResult<()> {
        let permit = self.acquire("open").await?;
        self.request(|reply| Command::Open {
            aspect_ratio,
            facing,
            permit,
            reply,
        })
        .await
    }

    /// Release session, device, recorder and still resources
    pub async fn close(&self) -> ControllerResult<()> {
        let permit = self.acquire("close").await?;
        self.request(|reply| Command::Close { permit, reply }).await
    }

    /// Switch lens; reopens the device when it is open
    pub async fn set_facing(&self, facing: LensFacing) -> ControllerResult<()> {
        if self.status.borrow().facing == facing {
            return Ok(());
        }
        let permit = self.acquire("reconfigure").await?;
        self.request(|reply| Command::SetFacing {
            facing,
            permit,
            reply,
        })
        .await
    }

    /// Change aspect ratio; returns `false` when the ratio is current or unsupported
    pub async fn set_aspect_ratio(&self, ratio: AspectRatio) -> ControllerResult<bool> {
        {
            let status = self.status.borrow();
            if status.aspect_ratio == ratio
                || (!status.supported_aspect_ratios.is_empty()
                    && !status.supported_aspect_ratios.contains(&ratio))
            {
                debug!(ratio = %ratio, "Aspect ratio change rejected");
                return Ok(false);
            }
        }
        let permit = self.acquire("reconfigure").await?;
        self.request(|reply| Command::SetAspectRatio {
            ratio,
            permit,
            reply,
        })
        .await
    }

    pub async fn set_flash(&self, mode: FlashMode) -> ControllerResult<()> {
        self.request(|reply| Command::SetFlash { mode, reply }).await
    }

    pub async fn set_focus_mode(&self, mode: FocusMode) -> ControllerResult<()> {
        self.request(|reply| Command::SetFocusMode { mode, reply }).await
    }

    /// Current UI rotation; affects still rotation immediately and preview sizing on the next open
    pub async fn set_display_rotation(&self, rotation: DisplayRotation) -> ControllerResult<()> {
        self.request(|reply| Command::SetDisplayRotation { rotation, reply })
            .await
    }

    /// Size of the preview view, used on the next open
    pub async fn set_view_size(&self, size: Size) -> ControllerResult<()> {
        self.request(|reply| Command::SetViewSize { size, reply }).await
    }

    /// Focus on a point given in normalized view coordinates
    pub async fn focus_at(&self, x: f32, y: f32) -> ControllerResult<()> {
        self.request(|reply| Command::FocusAt { x, y, reply }).await
    }

    /// Start a still capture; the result arrives as `StillSaved` or `StillFailed`
    pub async fn take_still(&self) -> ControllerResult<()> {
        self.request(|reply| Command::TakeStill { reply }).await
    }

    /// Start recording; `RecordingStarted` follows once the session is configured
    pub async fn start_recording(&self) -> ControllerResult<()> {
        self.request(|reply| Command::StartRecording { reply }).await
    }

    /// Stop recording. [`is_recording`](Self::is_recording) turns false immediately.
    pub async fn stop_recording(&self) -> ControllerResult<()> {
        if !self.recording.swap(false, Ordering::SeqCst) {
            return Err(ControllerError::NotRecording);
        }
        self.request(|reply| Command::StopRecording { reply }).await
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn supported_aspect_ratios(&self) -> BTreeSet<AspectRatio> {
        self.status.borrow().supported_aspect_ratios.clone()
    }

    pub fn is_flash_supported(&self) -> bool {
        self.status.borrow().flash_supported
    }

    pub fn is_facing_switch_supported(&self) -> bool {
        self.status.borrow().facing_switch_supported
    }

    /// Latest status snapshot
    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// True while an open, close or reconfigure holds the device lock
    pub fn is_device_lock_held(&self) -> bool {
        self.lock.is_held()
    }

    /// Close everything and stop the worker
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
    }
}
