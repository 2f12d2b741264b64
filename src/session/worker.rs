// SPDX-License-Identifier: GPL-3.0-only

//! The controller worker
//!
//! One task owns the device handle, the active session and the capture state
//! machine. Commands from [`CameraController`](super::controller::CameraController)
//! and callbacks from the device are processed strictly one at a time, so none
//! of this state needs a lock.
//!
//! The handle and the active session live together in [`OpenDevice`]: there
//! is no way to hold one without the other.

use super::controller::{
    Command, ControllerEvent, ControllerOptions, ControllerStatus, DeviceState,
};
use super::focus::{CaptureState, FocusStep, next_step};
use super::lock::DevicePermit;
use super::metering::{FocusRegions, regions_for_tap};
use super::orientation::{resolve, video_orientation_hint};
use super::request::{
    AfTrigger, CaptureRequest, PrecaptureTrigger, RequestSettings, RequestTemplate,
};
use super::sizes::{
    ResolutionTriple, SelectionRequest, SizeWarning, select_resolutions, supported_aspect_ratios,
};
use crate::backends::camera::types::{
    AspectRatio, BackendError, BackendResult, CameraCharacteristics, CameraFrame, DisplayRotation,
    FlashMode, FocusMode, FrameMetadata, LensFacing, Size, Surface, SurfaceKind,
};
use crate::backends::camera::{
    CaptureDevice, DeviceEvent, DeviceEventReceiver, DeviceEventSender, DeviceFault, DeviceHandle,
};
use crate::constants::recording::VIDEO_EXTENSION;
use crate::errors::{ControllerError, ControllerResult, PhotoError};
use crate::pipelines::photo::StillSink;
use crate::pipelines::video::{AudioSource, VideoSink, VideoSinkConfig, VideoSource};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// State shared between the worker and its handles
pub(crate) struct Shared {
    pub events: broadcast::Sender<ControllerEvent>,
    pub recording: Arc<AtomicBool>,
}

/// Output topology of a session
enum SessionKind {
    /// Preview and still surfaces
    Preview,
    /// Preview and recorder surfaces
    Recording {
        recorder: Surface,
        output: PathBuf,
        /// The video sink has been started
        started: bool,
    },
}

struct ActiveSession {
    id: Uuid,
    kind: SessionKind,
    configured: bool,
}

impl ActiveSession {
    fn new(kind: SessionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            configured: false,
        }
    }

    fn is_recording(&self) -> bool {
        matches!(self.kind, SessionKind::Recording { .. })
    }
}

struct OpenDevice {
    camera: CameraCharacteristics,
    handle: DeviceHandle,
    resolutions: ResolutionTriple,
    preview: Surface,
    still: Surface,
    session: ActiveSession,
}

enum Device {
    Closed,
    /// Holds the permit until the open callback arrives
    Opening {
        camera: CameraCharacteristics,
        _permit: DevicePermit,
    },
    Open(Box<OpenDevice>),
}

struct PendingStill {
    rotation: u32,
    target: Uuid,
    /// Still request id, once submitted
    request: Option<Uuid>,
    delivered: bool,
    completed: bool,
}

struct ManualFocus {
    regions: FocusRegions,
    until: Instant,
}

pub(crate) struct Worker {
    device: Arc<dyn CaptureDevice>,
    cameras: Vec<CameraCharacteristics>,
    options: ControllerOptions,
    still_sink: Arc<dyn StillSink>,
    video_sink: Box<dyn VideoSink>,
    shared: Shared,
    device_tx: DeviceEventSender,
    status_tx: watch::Sender<ControllerStatus>,

    facing: LensFacing,
    aspect_ratio: AspectRatio,
    flash: FlashMode,
    focus: FocusMode,
    display_rotation: DisplayRotation,
    view_size: Size,

    state: Device,
    capture_state: CaptureState,
    pending: Option<PendingStill>,
    focus_deadline: Option<Instant>,
    manual_focus: Option<ManualFocus>,
    supported_ratios: BTreeSet<AspectRatio>,
    size_warning: Option<SizeWarning>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    pub(crate) fn new(
        device: Arc<dyn CaptureDevice>,
        cameras: Vec<CameraCharacteristics>,
        still_sink: Arc<dyn StillSink>,
        video_sink: Box<dyn VideoSink>,
        options: ControllerOptions,
        shared: Shared,
    ) -> (Self, DeviceEventReceiver, watch::Receiver<ControllerStatus>) {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

        let worker = Self {
            device,
            cameras,
            still_sink,
            video_sink,
            shared,
            device_tx,
            status_tx,
            facing: options.facing,
            aspect_ratio: options.aspect_ratio,
            flash: options.flash,
            focus: options.focus,
            display_rotation: options.display_rotation,
            view_size: options.view_size,
            options,
            state: Device::Closed,
            capture_state: CaptureState::Preview,
            pending: None,
            focus_deadline: None,
            manual_focus: None,
            supported_ratios: BTreeSet::new(),
            size_warning: None,
        };
        worker.publish();
        (worker, device_rx, status_rx)
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut device_events: DeviceEventReceiver,
    ) {
        info!(cameras = self.cameras.len(), "Camera controller started");

        loop {
            let focus_deadline = self.focus_deadline;
            let hold_deadline = self.manual_focus.as_ref().map(|m| m.until);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = device_events.recv() => self.handle_event(event).await,
                _ = sleep_until_opt(focus_deadline) => self.on_focus_timeout(),
                _ = sleep_until_opt(hold_deadline) => self.on_focus_hold_expired(),
            }

            self.publish();
        }

        info!("Camera controller stopped");
    }

    async fn shutdown(&mut self) {
        self.teardown("shutdown").await;
        self.publish();
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.shared.events.send(event);
    }

    fn publish(&self) {
        let (device, camera_id, session, session_configured, resolutions, flash_supported) =
            match &self.state {
                Device::Closed => (DeviceState::Closed, None, None, false, None, false),
                Device::Opening { camera, .. } => (
                    DeviceState::Opening,
                    Some(camera.id.clone()),
                    None,
                    false,
                    None,
                    camera.flash_available,
                ),
                Device::Open(open) => (
                    DeviceState::Open,
                    Some(open.camera.id.clone()),
                    Some(open.session.id),
                    open.session.configured,
                    Some(open.resolutions),
                    open.camera.flash_available,
                ),
            };

        self.status_tx.send_replace(ControllerStatus {
            device,
            capture: self.capture_state,
            camera_id,
            facing: self.facing,
            aspect_ratio: self.aspect_ratio,
            flash: self.flash,
            focus: self.focus,
            display_rotation: self.display_rotation,
            session,
            session_configured,
            recording: self.shared.recording.load(Ordering::SeqCst),
            still_pending: self.pending.is_some(),
            manual_focus: self.manual_focus.is_some(),
            resolutions,
            size_warning: self.size_warning,
            supported_aspect_ratios: self.supported_ratios.clone(),
            flash_supported,
            facing_switch_supported: self.cameras.len() > 1,
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open {
                aspect_ratio,
                facing,
                permit,
                reply,
            } => {
                let result = self.open(aspect_ratio, facing, permit);
                let _ = reply.send(result);
            }
            Command::Close { permit, reply } => {
                self.teardown("close requested").await;
                drop(permit);
                let _ = reply.send(Ok(()));
            }
            Command::SetFacing {
                facing,
                permit,
                reply,
            } => {
                let result = self.set_facing(facing, permit).await;
                let _ = reply.send(result);
            }
            Command::SetAspectRatio {
                ratio,
                permit,
                reply,
            } => {
                let result = self.set_aspect_ratio(ratio, permit).await;
                let _ = reply.send(result);
            }
            Command::SetFlash { mode, reply } => {
                let _ = reply.send(self.set_flash(mode));
            }
            Command::SetFocusMode { mode, reply } => {
                let _ = reply.send(self.set_focus_mode(mode));
            }
            Command::SetDisplayRotation { rotation, reply } => {
                debug!(rotation = rotation.degrees(), "Display rotation changed");
                self.display_rotation = rotation;
                let _ = reply.send(Ok(()));
            }
            Command::SetViewSize { size, reply } => {
                debug!(size = %size, "View size changed");
                self.view_size = size;
                let _ = reply.send(Ok(()));
            }
            Command::FocusAt { x, y, reply } => {
                let _ = reply.send(self.focus_at(x, y));
            }
            Command::TakeStill { reply } => {
                let _ = reply.send(self.take_still());
            }
            Command::StartRecording { reply } => {
                let result = self.start_recording().await;
                let _ = reply.send(result);
            }
            Command::StopRecording { reply } => {
                let result = self.stop_recording().await;
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: DeviceEvent) {
        trace!(event = event.name(), "Device callback");
        match event {
            DeviceEvent::DeviceOpened { camera_id, handle } => {
                self.on_device_opened(camera_id, handle);
            }
            DeviceEvent::DeviceError { camera_id, fault } => {
                self.on_device_error(camera_id, fault).await;
            }
            DeviceEvent::SessionConfigured { session } => {
                self.on_session_configured(session).await;
            }
            DeviceEvent::SessionConfigFailed { session, reason } => {
                self.on_session_config_failed(session, reason).await;
            }
            DeviceEvent::CaptureProgressed {
                session,
                request,
                metadata,
            } => self.on_capture_result(session, request, &metadata, false),
            DeviceEvent::CaptureCompleted {
                session,
                request,
                metadata,
            } => self.on_capture_result(session, request, &metadata, true),
            DeviceEvent::CaptureFailed {
                session,
                request,
                reason,
            } => self.on_capture_failed(session, request, reason),
            DeviceEvent::ImageAvailable {
                session,
                surface,
                frame,
            } => self.on_image_available(session, surface, frame),
        }
    }

    // ---- open / close ----

    fn camera_for(&self, facing: LensFacing) -> Option<CameraCharacteristics> {
        self.cameras.iter().find(|c| c.facing == facing).cloned()
    }

    fn open(
        &mut self,
        aspect_ratio: AspectRatio,
        facing: LensFacing,
        permit: DevicePermit,
    ) -> ControllerResult<()> {
        if !matches!(self.state, Device::Closed) {
            return Err(ControllerError::InvalidState(
                "camera is already open".into(),
            ));
        }
        self.aspect_ratio = aspect_ratio;
        self.facing = facing;
        self.begin_open(permit)
    }

    /// Issue the hardware open; the permit is released on the callback or right here on failure
    fn begin_open(&mut self, permit: DevicePermit) -> ControllerResult<()> {
        let camera = self.camera_for(self.facing).ok_or_else(|| {
            ControllerError::InvalidState(format!("no {} camera available", self.facing))
        })?;

        info!(
            camera = %camera.id,
            facing = %self.facing,
            ratio = %self.aspect_ratio,
            "Opening camera"
        );

        if let Err(e) = self.device.open(&camera.id, self.device_tx.clone()) {
            drop(permit);
            error!(camera = %camera.id, error = %e, "Failed to open camera");
            return Err(e.into());
        }

        self.state = Device::Opening {
            camera,
            _permit: permit,
        };
        Ok(())
    }

    fn on_device_opened(&mut self, camera_id: String, handle: DeviceHandle) {
        let camera = match std::mem::replace(&mut self.state, Device::Closed) {
            Device::Opening {
                camera,
                _permit: permit,
            } if camera.id == camera_id => {
                drop(permit);
                camera
            }
            other => {
                self.state = other;
                warn!(camera = %camera_id, "Unexpected open completion, closing handle");
                self.device.close(handle);
                return;
            }
        };

        let request = SelectionRequest {
            aspect_ratio: self.aspect_ratio,
            view: self.view_size,
            display_size: self.options.display_size,
            display_rotation: self.display_rotation,
            max_preview: self.options.max_preview,
            video_ceiling: self.options.video_ceiling,
        };
        let Some((resolutions, warning)) = select_resolutions(&camera, &request) else {
            error!(camera = %camera.id, "Camera reports no output sizes");
            self.device.close(handle);
            self.emit(ControllerEvent::DeviceError {
                error: ControllerError::ConfigureFailed("camera reports no output sizes".into()),
            });
            return;
        };

        self.supported_ratios =
            supported_aspect_ratios(&camera.preview_sizes, self.options.max_preview);
        self.size_warning = warning;
        if let Some(warning) = warning {
            warn!(camera = %camera.id, %warning, "Degraded preview size");
            self.emit(ControllerEvent::SizeWarning(warning));
        }

        let preview = Surface::new(SurfaceKind::Preview, resolutions.preview);
        let still = self.still_sink.acquire_target(resolutions.still);
        let session = ActiveSession::new(SessionKind::Preview);

        if let Err(e) = self
            .device
            .create_session(&handle, session.id, &[preview.clone(), still.clone()])
        {
            error!(camera = %camera.id, error = %e, "Failed to create preview session");
            self.still_sink.release_target(still.id);
            self.device.close(handle);
            self.emit(ControllerEvent::DeviceError {
                error: ControllerError::ConfigureFailed(e.to_string()),
            });
            return;
        }

        info!(
            camera = %camera.id,
            session = %session.id,
            preview = %resolutions.preview,
            still = %resolutions.still,
            video = %resolutions.video,
            ratio = %resolutions.aspect_ratio,
            "Camera opened"
        );

        let camera_id = camera.id.clone();
        self.state = Device::Open(Box::new(OpenDevice {
            camera,
            handle,
            resolutions,
            preview,
            still,
            session,
        }));
        self.emit(ControllerEvent::Opened {
            camera_id,
            resolutions,
        });
    }

    async fn on_device_error(&mut self, camera_id: String, fault: DeviceFault) {
        let (opening, active) = match &self.state {
            Device::Opening { camera, .. } => (true, camera.id == camera_id),
            Device::Open(open) => (false, open.camera.id == camera_id),
            Device::Closed => (false, false),
        };
        if !active {
            debug!(camera = %camera_id, %fault, "Ignoring error from inactive camera");
            return;
        }

        error!(camera = %camera_id, %fault, "Camera failed");
        if opening {
            // Dropping the opening record releases the lock
            self.state = Device::Closed;
            self.reset_capture();
        } else {
            self.teardown("device fault").await;
        }
        self.emit(ControllerEvent::DeviceError {
            error: ControllerError::DeviceFatal(fault.to_string()),
        });
    }

    /// Release session, device handle, recorder and still resources, in that order
    async fn teardown(&mut self, reason: &'static str) {
        let open = match std::mem::replace(&mut self.state, Device::Closed) {
            Device::Closed => {
                self.reset_capture();
                return;
            }
            Device::Opening { camera, .. } => {
                debug!(camera = %camera.id, reason, "Abandoning open in progress");
                self.reset_capture();
                return;
            }
            Device::Open(open) => *open,
        };

        let OpenDevice {
            camera,
            handle,
            still,
            session,
            ..
        } = open;

        self.device.close_session(session.id);
        self.device.close(handle);
        if let SessionKind::Recording { started, .. } = session.kind {
            self.finish_recording(started).await;
        }
        self.still_sink.release_target(still.id);
        self.reset_capture();

        info!(camera = %camera.id, reason, "Camera closed");
        self.emit(ControllerEvent::Closed);
    }

    fn reset_capture(&mut self) {
        self.capture_state = CaptureState::Preview;
        self.pending = None;
        self.focus_deadline = None;
        self.manual_focus = None;
    }

    async fn reopen(&mut self, permit: DevicePermit, reason: &'static str) -> ControllerResult<()> {
        match self.state {
            Device::Closed => Ok(()),
            Device::Opening { .. } => {
                debug!(reason, "Open in progress, change applies on next open");
                Ok(())
            }
            Device::Open(_) => {
                self.teardown(reason).await;
                self.begin_open(permit)
            }
        }
    }

    async fn set_facing(&mut self, facing: LensFacing, permit: DevicePermit) -> ControllerResult<()> {
        if facing == self.facing {
            return Ok(());
        }
        if self.camera_for(facing).is_none() {
            return Err(ControllerError::InvalidState(format!(
                "no {} camera available",
                facing
            )));
        }
        info!(from = %self.facing, to = %facing, "Switching camera");
        self.facing = facing;
        self.reopen(permit, "switching camera").await
    }

    async fn set_aspect_ratio(
        &mut self,
        ratio: AspectRatio,
        permit: DevicePermit,
    ) -> ControllerResult<bool> {
        if ratio == self.aspect_ratio
            || (!self.supported_ratios.is_empty() && !self.supported_ratios.contains(&ratio))
        {
            return Ok(false);
        }
        info!(from = %self.aspect_ratio, to = %ratio, "Changing aspect ratio");
        self.aspect_ratio = ratio;
        self.reopen(permit, "changing aspect ratio").await?;
        Ok(true)
    }

    // ---- sessions and requests ----

    fn is_current_session(&self, session: Uuid) -> bool {
        matches!(&self.state, Device::Open(open) if open.session.id == session)
    }

    fn request_settings(&self, open: &OpenDevice) -> RequestSettings {
        RequestSettings {
            flash: self.flash,
            flash_supported: open.camera.flash_available,
            focus: self.focus,
            auto_focus_supported: open.camera.auto_focus_supported(),
            recording: open.session.is_recording(),
            manual_regions: self.manual_focus.as_ref().map(|m| m.regions.clone()),
        }
    }

    fn repeating_request(&self, open: &OpenDevice) -> CaptureRequest {
        let settings = self.request_settings(open);
        match &open.session.kind {
            SessionKind::Preview => {
                CaptureRequest::build(RequestTemplate::Preview, &[&open.preview], &settings)
            }
            SessionKind::Recording { recorder, .. } => CaptureRequest::build(
                RequestTemplate::Record,
                &[&open.preview, recorder],
                &settings,
            ),
        }
    }

    /// Rebuild and resubmit the repeating request of a configured session
    fn submit_repeating(&self) -> BackendResult<()> {
        let Device::Open(open) = &self.state else {
            return Err(BackendError::Closed("camera is not open".into()));
        };
        if !open.session.configured {
            return Ok(());
        }
        let request = self.repeating_request(open);
        self.device.set_repeating(open.session.id, &request)
    }

    /// Bind a fresh preview + still session to the open device
    async fn start_preview_session(&mut self) {
        let result = {
            let Device::Open(open) = &mut self.state else {
                return;
            };
            open.session = ActiveSession::new(SessionKind::Preview);
            self.device.create_session(
                &open.handle,
                open.session.id,
                &[open.preview.clone(), open.still.clone()],
            )
        };

        if let Err(e) = result {
            error!(error = %e, "Failed to restore preview session");
            self.teardown("preview session failed").await;
            self.emit(ControllerEvent::DeviceError {
                error: ControllerError::ConfigureFailed(e.to_string()),
            });
        }
    }

    async fn on_session_configured(&mut self, session: Uuid) {
        let starting_recording = {
            let Device::Open(open) = &mut self.state else {
                debug!(session = %session, "Session configured after close");
                return;
            };
            if open.session.id != session {
                debug!(session = %session, "Ignoring stale session");
                return;
            }
            open.session.configured = true;
            matches!(open.session.kind, SessionKind::Recording { started: false, .. })
        };

        if let Err(e) = self.submit_repeating() {
            warn!(session = %session, error = %e, "Failed to start repeating request");
            if starting_recording {
                self.abort_recording_start(e.to_string()).await;
            }
            return;
        }

        if !starting_recording {
            debug!(session = %session, "Preview running");
            self.emit(ControllerEvent::PreviewStarted { session });
            return;
        }

        if let Err(e) = self.video_sink.start().await {
            warn!(error = %e, "Video sink failed to start");
            self.abort_recording_start(e.to_string()).await;
            return;
        }

        let mut output = None;
        if let Device::Open(open) = &mut self.state
            && let SessionKind::Recording {
                started, output: path, ..
            } = &mut open.session.kind
        {
            *started = true;
            output = Some(path.clone());
        }
        if let Some(path) = output {
            self.shared.recording.store(true, Ordering::SeqCst);
            info!(path = %path.display(), "Recording started");
            self.emit(ControllerEvent::RecordingStarted { path });
        }
    }

    async fn on_session_config_failed(&mut self, session: Uuid, reason: String) {
        let recording = match &self.state {
            Device::Open(open) if open.session.id == session => open.session.is_recording(),
            _ => {
                debug!(session = %session, "Ignoring failure of stale session");
                return;
            }
        };

        if recording {
            warn!(session = %session, %reason, "Recording session rejected, falling back to preview");
            self.abort_recording_start(reason).await;
        } else {
            error!(session = %session, %reason, "Preview session rejected");
            self.teardown("preview session failed").await;
            self.emit(ControllerEvent::DeviceError {
                error: ControllerError::ConfigureFailed(reason),
            });
        }
    }

    // ---- still capture ----

    fn take_still(&mut self) -> ControllerResult<()> {
        if self.pending.is_some() {
            return Err(ControllerError::StillInProgress);
        }
        let Device::Open(open) = &self.state else {
            return Err(ControllerError::InvalidState("camera is not open".into()));
        };
        if open.session.is_recording() {
            return Err(ControllerError::InvalidState(
                "cannot take a photo while recording".into(),
            ));
        }
        if !open.session.configured || self.capture_state != CaptureState::Preview {
            return Err(ControllerError::InvalidState("preview is not running".into()));
        }

        let rotation = resolve(
            open.camera.sensor_orientation,
            self.display_rotation,
            open.camera.facing,
        );
        let settings = self.request_settings(open);
        let session = open.session.id;
        let trigger = settings.wants_focus_lock().then(|| {
            CaptureRequest::build(RequestTemplate::Preview, &[&open.preview], &settings)
                .with_af_trigger(AfTrigger::Start)
        });

        self.pending = Some(PendingStill {
            rotation,
            target: open.still.id,
            request: None,
            delivered: false,
            completed: false,
        });

        let Some(trigger) = trigger else {
            debug!(rotation, "Taking still without focus lock");
            return self.capture_still();
        };

        debug!(rotation, "Locking focus");
        self.capture_state = CaptureState::LockingFocus;
        self.focus_deadline = Some(Instant::now() + self.options.focus_timeout);
        if let Err(e) = self.device.capture(session, &trigger) {
            warn!(error = %e, "Failed to submit focus trigger");
            self.abandon_still();
            return Err(ControllerError::CaptureSubmit(e.to_string()));
        }
        Ok(())
    }

    /// Submit the still request with whatever focus and exposure currently hold
    fn capture_still(&mut self) -> ControllerResult<()> {
        self.focus_deadline = None;
        let Some(rotation) = self.pending.as_ref().map(|p| p.rotation) else {
            self.capture_state = CaptureState::Preview;
            return Err(ControllerError::InvalidState("no photo pending".into()));
        };
        let Device::Open(open) = &self.state else {
            self.reset_capture();
            return Err(ControllerError::InvalidState("camera is not open".into()));
        };

        let settings = self.request_settings(open);
        let request = CaptureRequest::build(RequestTemplate::StillCapture, &[&open.still], &settings)
            .with_jpeg_orientation(rotation);
        let session = open.session.id;

        self.capture_state = CaptureState::Capturing;
        if let Err(e) = self.device.stop_repeating(session) {
            debug!(error = %e, "Failed to pause preview before still");
        }
        if let Err(e) = self.device.capture(session, &request) {
            warn!(error = %e, "Failed to submit still request");
            self.abandon_still();
            return Err(ControllerError::CaptureSubmit(e.to_string()));
        }

        if let Some(pending) = self.pending.as_mut() {
            pending.request = Some(request.id);
        }
        info!(request = %request.id, rotation, flash = ?self.flash, "Capturing still");
        Ok(())
    }

    /// Drop the pending still and bring preview back
    fn abandon_still(&mut self) {
        self.pending = None;
        self.focus_deadline = None;
        self.unlock_focus();
    }

    /// Cancel the AF trigger and resume the repeating request
    fn unlock_focus(&mut self) {
        self.capture_state = CaptureState::Preview;
        let Device::Open(open) = &self.state else {
            return;
        };
        if !open.session.configured {
            return;
        }

        let settings = self.request_settings(open);
        let cancel = CaptureRequest::build(RequestTemplate::Preview, &[&open.preview], &settings)
            .with_af_trigger(AfTrigger::Cancel);
        if let Err(e) = self.device.capture(open.session.id, &cancel) {
            debug!(error = %e, "Failed to cancel focus trigger");
        }
        let repeating = self.repeating_request(open);
        if let Err(e) = self.device.set_repeating(open.session.id, &repeating) {
            warn!(error = %e, "Failed to resume preview");
        }
    }

    fn on_capture_result(
        &mut self,
        session: Uuid,
        request: Uuid,
        metadata: &FrameMetadata,
        completed: bool,
    ) {
        if !self.is_current_session(session) {
            trace!(session = %session, "Ignoring result from stale session");
            return;
        }

        let is_still = self.pending.as_ref().and_then(|p| p.request) == Some(request);
        if is_still {
            if completed {
                self.on_still_completed();
            }
            return;
        }
        if !self.capture_state.is_converging() {
            return;
        }

        match next_step(self.capture_state, metadata) {
            FocusStep::Wait => {}
            FocusStep::StartPrecapture => self.start_precapture(),
            FocusStep::AwaitExposureSettle => {
                debug!("Waiting for exposure to settle");
                self.capture_state = CaptureState::WaitingExposureSettle;
            }
            FocusStep::CaptureStill => {
                if let Err(e) = self.capture_still() {
                    self.emit(ControllerEvent::StillFailed {
                        error: PhotoError::CaptureFailed(e.to_string()),
                    });
                }
            }
        }
    }

    fn start_precapture(&mut self) {
        let Device::Open(open) = &self.state else {
            return;
        };
        let settings = self.request_settings(open);
        let request = CaptureRequest::build(RequestTemplate::Preview, &[&open.preview], &settings)
            .with_precapture_trigger(PrecaptureTrigger::Start);
        let session = open.session.id;

        debug!("Running precapture sequence");
        self.capture_state = CaptureState::Precapturing;
        if let Err(e) = self.device.capture(session, &request) {
            warn!(error = %e, "Failed to submit precapture trigger");
            self.abandon_still();
            self.emit(ControllerEvent::StillFailed {
                error: PhotoError::CaptureFailed(e.to_string()),
            });
        }
    }

    fn on_still_completed(&mut self) {
        debug!("Still capture completed");
        self.unlock_focus();
        let delivered = self.pending.as_ref().is_some_and(|p| p.delivered);
        if delivered {
            self.pending = None;
        } else if let Some(pending) = self.pending.as_mut() {
            pending.completed = true;
        }
    }

    fn on_image_available(&mut self, session: Uuid, surface: Uuid, frame: CameraFrame) {
        if !self.is_current_session(session) {
            trace!(session = %session, "Dropping image from stale session");
            return;
        }
        let Some(pending) = self.pending.as_mut() else {
            debug!("Dropping image with no photo pending");
            return;
        };
        if pending.target != surface || pending.delivered {
            return;
        }

        pending.delivered = true;
        let rotation = pending.rotation;
        if pending.completed {
            self.pending = None;
        }

        let sink = Arc::clone(&self.still_sink);
        let events = self.shared.events.clone();
        tokio::spawn(async move {
            match sink.deliver(frame, rotation).await {
                Ok(path) => {
                    let _ = events.send(ControllerEvent::StillSaved { path });
                }
                Err(e) => {
                    warn!(error = %e, "Still sink failed");
                    let _ = events.send(ControllerEvent::StillFailed { error: e });
                }
            }
        });
    }

    fn on_capture_failed(&mut self, session: Uuid, request: Uuid, reason: String) {
        if !self.is_current_session(session) {
            return;
        }
        let is_still = self.pending.as_ref().and_then(|p| p.request) == Some(request);
        if !is_still && !self.capture_state.is_converging() {
            debug!(request = %request, %reason, "Capture failed outside still sequence");
            return;
        }

        warn!(request = %request, %reason, "Still capture failed");
        self.abandon_still();
        self.emit(ControllerEvent::StillFailed {
            error: PhotoError::CaptureFailed(reason),
        });
    }

    fn on_focus_timeout(&mut self) {
        self.focus_deadline = None;
        if !self.capture_state.is_converging() {
            return;
        }
        warn!(state = ?self.capture_state, "Focus timed out, capturing anyway");
        self.emit(ControllerEvent::FocusTimedOut);
        if let Err(e) = self.capture_still() {
            self.emit(ControllerEvent::StillFailed {
                error: PhotoError::CaptureFailed(e.to_string()),
            });
        }
    }

    // ---- settings ----

    fn is_streaming(&self) -> bool {
        matches!(&self.state, Device::Open(open) if open.session.configured)
            && self.capture_state == CaptureState::Preview
    }

    fn set_flash(&mut self, mode: FlashMode) -> ControllerResult<()> {
        let previous = std::mem::replace(&mut self.flash, mode);
        if previous == mode || !self.is_streaming() {
            return Ok(());
        }
        if let Err(e) = self.submit_repeating() {
            warn!(error = %e, ?mode, "Failed to apply flash mode, reverting");
            self.flash = previous;
            return Err(ControllerError::CaptureSubmit(e.to_string()));
        }
        debug!(?mode, "Flash mode applied");
        Ok(())
    }

    fn set_focus_mode(&mut self, mode: FocusMode) -> ControllerResult<()> {
        let previous = std::mem::replace(&mut self.focus, mode);
        if previous == mode {
            return Ok(());
        }
        if mode == FocusMode::Off {
            self.manual_focus = None;
        }
        if !self.is_streaming() {
            return Ok(());
        }
        if let Err(e) = self.submit_repeating() {
            warn!(error = %e, ?mode, "Failed to apply focus mode, reverting");
            self.focus = previous;
            return Err(ControllerError::CaptureSubmit(e.to_string()));
        }
        debug!(?mode, "Focus mode applied");
        Ok(())
    }

    fn focus_at(&mut self, x: f32, y: f32) -> ControllerResult<()> {
        let Device::Open(open) = &self.state else {
            return Err(ControllerError::InvalidState("camera is not open".into()));
        };
        if !open.session.configured || self.capture_state != CaptureState::Preview {
            return Err(ControllerError::InvalidState("preview is not running".into()));
        }
        if self.focus != FocusMode::Auto || !open.camera.auto_focus_supported() {
            return Err(ControllerError::InvalidState(
                "auto-focus is not available".into(),
            ));
        }

        let regions = regions_for_tap(
            x,
            y,
            self.display_rotation,
            open.camera.sensor_orientation,
            open.camera.active_array,
        );
        let session = open.session.id;
        self.manual_focus = Some(ManualFocus {
            regions,
            until: Instant::now() + self.options.focus_hold,
        });

        let settings = self.request_settings(open);
        let trigger = CaptureRequest::build(RequestTemplate::Preview, &[&open.preview], &settings)
            .with_af_trigger(AfTrigger::Start);
        let repeating = self.repeating_request(open);

        let submitted = self
            .device
            .capture(session, &trigger)
            .and_then(|_| self.device.set_repeating(session, &repeating));
        if let Err(e) = submitted {
            warn!(error = %e, "Failed to submit manual focus");
            self.manual_focus = None;
            return Err(ControllerError::CaptureSubmit(e.to_string()));
        }
        debug!(x, y, "Manual focus requested");
        Ok(())
    }

    fn on_focus_hold_expired(&mut self) {
        self.manual_focus = None;
        debug!("Manual focus released, resuming continuous focus");
        if self.is_streaming()
            && let Err(e) = self.submit_repeating()
        {
            warn!(error = %e, "Failed to resume continuous focus");
        }
    }

    // ---- recording ----

    async fn start_recording(&mut self) -> ControllerResult<()> {
        let (size, sensor, facing) = {
            let Device::Open(open) = &self.state else {
                return Err(ControllerError::InvalidState("camera is not open".into()));
            };
            match open.session.kind {
                SessionKind::Recording { started: true, .. } => {
                    return Err(ControllerError::AlreadyRecording);
                }
                SessionKind::Recording { .. } => {
                    return Err(ControllerError::InvalidState(
                        "recording is starting".into(),
                    ));
                }
                SessionKind::Preview => {}
            }
            if !open.session.configured {
                return Err(ControllerError::InvalidState("preview is not running".into()));
            }
            if self.pending.is_some() || self.capture_state != CaptureState::Preview {
                return Err(ControllerError::InvalidState(
                    "a photo is being taken".into(),
                ));
            }
            (
                open.resolutions.video,
                open.camera.sensor_orientation,
                open.camera.facing,
            )
        };

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let output = self
            .options
            .video_dir
            .join(format!("video_{}.{}", timestamp, VIDEO_EXTENSION));
        let config = VideoSinkConfig {
            size,
            output_path: output.clone(),
            orientation_hint: video_orientation_hint(sensor, self.display_rotation, facing),
            audio_source: if self.options.audio_enabled {
                AudioSource::Microphone
            } else {
                AudioSource::None
            },
            video_source: VideoSource::Surface,
            bitrate_kbps: self.options.bitrate_preset.bitrate_kbps(size),
            framerate: self.options.video_framerate,
        };

        let recorder = self.video_sink.prepare(&config).await.map_err(|e| {
            warn!(error = %e, "Failed to prepare video sink");
            ControllerError::Recording(e)
        })?;

        let result = {
            let Device::Open(open) = &mut self.state else {
                self.video_sink.release().await;
                return Err(ControllerError::InvalidState("camera is not open".into()));
            };
            let previous = open.session.id;
            if let Err(e) = self.device.stop_repeating(previous) {
                debug!(error = %e, "Failed to stop preview before recording");
            }
            self.device.close_session(previous);

            open.session = ActiveSession::new(SessionKind::Recording {
                recorder: recorder.clone(),
                output,
                started: false,
            });
            self.device.create_session(
                &open.handle,
                open.session.id,
                &[open.preview.clone(), recorder],
            )
        };

        if let Err(e) = result {
            warn!(error = %e, "Recording session rejected, falling back to preview");
            self.video_sink.release().await;
            self.start_preview_session().await;
            return Err(ControllerError::ConfigureFailed(e.to_string()));
        }
        info!(size = %size, "Configuring recording session");
        Ok(())
    }

    /// Undo a recording start that never reached the recorder
    async fn abort_recording_start(&mut self, reason: String) {
        let session = match &self.state {
            Device::Open(open) if open.session.is_recording() => open.session.id,
            _ => return,
        };
        if let Err(e) = self.device.stop_repeating(session) {
            trace!(error = %e, "Recording session already stopped");
        }
        self.video_sink.release().await;
        self.device.close_session(session);
        self.start_preview_session().await;
        self.emit(ControllerEvent::RecordingFailed {
            error: ControllerError::ConfigureFailed(reason),
        });
    }

    async fn stop_recording(&mut self) -> ControllerResult<()> {
        self.shared.recording.store(false, Ordering::SeqCst);
        let session = match &self.state {
            Device::Open(open) if matches!(open.session.kind, SessionKind::Recording { started: true, .. }) => {
                open.session.id
            }
            _ => return Err(ControllerError::NotRecording),
        };

        if let Err(e) = self.device.stop_repeating(session) {
            debug!(error = %e, "Failed to stop recording request");
        }
        self.finish_recording(true).await;
        self.device.close_session(session);
        self.start_preview_session().await;
        Ok(())
    }

    /// Stop the video sink and keep or discard what it wrote
    async fn finish_recording(&mut self, started: bool) {
        self.shared.recording.store(false, Ordering::SeqCst);
        if started {
            match self.video_sink.stop().await {
                Ok(bytes) if bytes > 0 => match self.video_sink.finalize().await {
                    Ok(path) => {
                        info!(path = %path.display(), bytes, "Recording saved");
                        self.emit(ControllerEvent::RecordingSaved { path, bytes });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to finalize recording");
                        self.video_sink.discard().await;
                        self.emit(ControllerEvent::RecordingFailed { error: e.into() });
                    }
                },
                Ok(_) => {
                    warn!("Recording produced no data, discarding");
                    self.video_sink.discard().await;
                    self.emit(ControllerEvent::RecordingDiscarded {
                        reason: "no data recorded".into(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Recorder failed to stop, discarding output");
                    self.video_sink.discard().await;
                    self.emit(ControllerEvent::RecordingDiscarded {
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            self.video_sink.discard().await;
        }
        self.video_sink.release().await;
    }
}
