// SPDX-License-Identifier: GPL-3.0-only

//! Scripted in-process capture device
//!
//! Behaves like a two-camera phone module: a rear camera mounted at 90° with
//! a flash unit and auto-focus, and a fixed-focus front camera mounted at 270°.
//! Callbacks are delivered from spawned tasks after short delays so the
//! controller sees the same asynchrony as with real hardware.
//!
//! [`VirtualBehavior`] scripts how opens, session configuration and the AF/AE
//! routines respond. Every call is recorded as a [`VirtualCall`] so tests can
//! assert on what the controller submitted.

use super::types::{
    AeState, AfMode, AfState, BackendError, BackendResult, CameraCharacteristics, CameraFrame,
    FrameData, FrameMetadata, LensFacing, PixelFormat, SensorRotation, Size, Surface, SurfaceKind,
};
use super::{CaptureDevice, DeviceEvent, DeviceEventSender, DeviceFault, DeviceHandle};
use crate::session::request::{AfTrigger, CaptureRequest, PrecaptureTrigger, RequestTemplate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Minimal JPEG stream (SOI + EOI) returned for stills unless overridden
const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];

/// How an open attempt fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    /// `open` itself returns this error
    Immediate(BackendError),
    /// `open` succeeds, then the device reports this fault
    Callback(DeviceFault),
}

/// Script for the virtual device
#[derive(Debug, Clone)]
pub struct VirtualBehavior {
    /// Delay before `DeviceOpened`/`DeviceError`
    pub open_delay: Duration,
    /// Delay before `SessionConfigured`/`SessionConfigFailed`
    pub configure_delay: Duration,
    /// Delay between results of a one-shot request
    pub result_interval: Duration,
    /// Interval of frames pushed to surfaces that carry a frame channel
    pub frame_interval: Duration,
    pub open_failure: Option<OpenFailure>,
    /// Reject sessions that include a recorder surface
    pub fail_recorder_sessions: bool,
    /// AF states reported, one result each, after an AF trigger start
    pub af_response: Vec<Option<AfState>>,
    /// AE state reported alongside the AF results
    pub lock_ae_state: Option<AeState>,
    /// AE states reported, one result each, after a precapture trigger
    pub precapture_response: Vec<Option<AeState>>,
    /// Never report results for focus and precapture triggers
    pub silent_focus: bool,
    /// Report still captures as failed
    pub fail_still_capture: bool,
    /// Bytes delivered for each still
    pub still_bytes: Vec<u8>,
}

impl Default for VirtualBehavior {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_millis(20),
            configure_delay: Duration::from_millis(10),
            result_interval: Duration::from_millis(33),
            frame_interval: Duration::from_millis(33),
            open_failure: None,
            fail_recorder_sessions: false,
            af_response: vec![Some(AfState::ActiveScan), Some(AfState::FocusedLocked)],
            lock_ae_state: Some(AeState::Converged),
            precapture_response: vec![Some(AeState::Precapture), Some(AeState::Converged)],
            silent_focus: false,
            fail_still_capture: false,
            still_bytes: PLACEHOLDER_JPEG.to_vec(),
        }
    }
}

/// One call the device received
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualCall {
    Open { camera_id: String },
    Close { camera_id: String },
    CreateSession { session: Uuid, kinds: Vec<SurfaceKind> },
    CloseSession { session: Uuid },
    SetRepeating { session: Uuid, request: CaptureRequest },
    StopRepeating { session: Uuid },
    Capture { session: Uuid, request: CaptureRequest },
}

struct SessionRecord {
    handle: Uuid,
    surfaces: Vec<Surface>,
    /// Cleared when the session closes or its repeating request changes
    pump: Option<Arc<AtomicBool>>,
}

struct OpenRecord {
    camera_id: String,
    events: DeviceEventSender,
}

#[derive(Default)]
struct State {
    open: HashMap<Uuid, OpenRecord>,
    sessions: HashMap<Uuid, SessionRecord>,
    calls: Vec<VirtualCall>,
}

/// In-process [`CaptureDevice`] driven by a [`VirtualBehavior`] script
pub struct VirtualDevice {
    cameras: Vec<CameraCharacteristics>,
    behavior: Mutex<VirtualBehavior>,
    state: Mutex<State>,
    sequence: Arc<AtomicU64>,
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDevice {
    /// Rear and front camera with the default script
    pub fn new() -> Self {
        Self::with_behavior(VirtualBehavior::default())
    }

    pub fn with_behavior(behavior: VirtualBehavior) -> Self {
        Self::with_cameras(default_cameras(), behavior)
    }

    pub fn with_cameras(cameras: Vec<CameraCharacteristics>, behavior: VirtualBehavior) -> Self {
        Self {
            cameras,
            behavior: Mutex::new(behavior),
            state: Mutex::new(State::default()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn behavior(&self) -> VirtualBehavior {
        self.behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the script for subsequent calls
    pub fn set_behavior(&self, behavior: VirtualBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<VirtualCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of cameras currently open
    pub fn open_count(&self) -> usize {
        self.state().open.len()
    }

    /// Number of sessions not yet closed or invalidated
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Report a fatal fault on every open camera, as if it were unplugged
    pub fn inject_fault(&self, fault: DeviceFault) {
        let mut state = self.state();
        for (_, record) in state.open.drain() {
            let _ = record.events.send(DeviceEvent::DeviceError {
                camera_id: record.camera_id,
                fault: fault.clone(),
            });
        }
        for (_, session) in state.sessions.drain() {
            stop_pump(&session);
        }
    }

    fn session_events(&self, session: Uuid) -> BackendResult<(DeviceEventSender, Vec<Surface>)> {
        let state = self.state();
        let record = state
            .sessions
            .get(&session)
            .ok_or_else(|| BackendError::Closed(format!("session {} is not active", session)))?;
        let open = state
            .open
            .get(&record.handle)
            .ok_or_else(|| BackendError::Closed("camera is closed".into()))?;
        Ok((open.events.clone(), record.surfaces.clone()))
    }

    fn next_metadata(&self, af_state: Option<AfState>, ae_state: Option<AeState>) -> FrameMetadata {
        FrameMetadata {
            sequence: Some(self.sequence.fetch_add(1, Ordering::Relaxed)),
            af_state,
            ae_state,
            exposure_time: Some(16_666),
            lens_position: af_state.map(|_| 0.5),
        }
    }
}

fn stop_pump(session: &SessionRecord) {
    if let Some(running) = &session.pump {
        running.store(false, Ordering::Relaxed);
    }
}

/// Default two-camera module
pub fn default_cameras() -> Vec<CameraCharacteristics> {
    let four_three = vec![
        Size::new(4032, 3024),
        Size::new(1920, 1440),
        Size::new(1440, 1080),
        Size::new(1280, 960),
        Size::new(640, 480),
    ];
    let sixteen_nine = vec![
        Size::new(3840, 2160),
        Size::new(1920, 1080),
        Size::new(1280, 720),
        Size::new(640, 360),
    ];
    let all: Vec<Size> = four_three.iter().chain(sixteen_nine.iter()).copied().collect();

    vec![
        CameraCharacteristics {
            id: "0".into(),
            facing: LensFacing::Back,
            sensor_orientation: SensorRotation::Rotate90,
            active_array: Size::new(4032, 3024),
            preview_sizes: all.clone(),
            still_sizes: all.clone(),
            video_sizes: all.clone(),
            af_modes: vec![
                AfMode::Off,
                AfMode::Auto,
                AfMode::ContinuousPicture,
                AfMode::ContinuousVideo,
                AfMode::Macro,
            ],
            flash_available: true,
        },
        CameraCharacteristics {
            id: "1".into(),
            facing: LensFacing::Front,
            sensor_orientation: SensorRotation::Rotate270,
            active_array: Size::new(2592, 1944),
            preview_sizes: four_three.clone(),
            still_sizes: vec![Size::new(2592, 1944), Size::new(1280, 960)],
            video_sizes: four_three,
            af_modes: vec![AfMode::Off],
            flash_available: false,
        },
    ]
}

/// Emit `events` in order, `interval` apart, after an initial `interval`
fn emit_sequence(sender: DeviceEventSender, events: Vec<DeviceEvent>, interval: Duration) {
    tokio::spawn(async move {
        for event in events {
            tokio::time::sleep(interval).await;
            trace!(event = event.name(), "Virtual device callback");
            if sender.send(event).is_err() {
                break;
            }
        }
    });
}

fn frame_for(surface: &Surface, data: &[u8], format: PixelFormat) -> CameraFrame {
    CameraFrame {
        width: surface.size.width,
        height: surface.size.height,
        data: FrameData::from_vec(data.to_vec()),
        format,
        captured_at: std::time::Instant::now(),
        sensor_timestamp_ns: None,
    }
}

impl CaptureDevice for VirtualDevice {
    fn cameras(&self) -> BackendResult<Vec<CameraCharacteristics>> {
        Ok(self.cameras.clone())
    }

    fn open(&self, camera_id: &str, events: DeviceEventSender) -> BackendResult<()> {
        self.state().calls.push(VirtualCall::Open {
            camera_id: camera_id.to_string(),
        });

        if !self.cameras.iter().any(|c| c.id == camera_id) {
            return Err(BackendError::DeviceNotFound(camera_id.to_string()));
        }

        let behavior = self.behavior();
        let event = match behavior.open_failure {
            Some(OpenFailure::Immediate(err)) => return Err(err),
            Some(OpenFailure::Callback(fault)) => DeviceEvent::DeviceError {
                camera_id: camera_id.to_string(),
                fault,
            },
            None => {
                let handle = DeviceHandle::new(camera_id);
                self.state().open.insert(
                    handle.id(),
                    OpenRecord {
                        camera_id: camera_id.to_string(),
                        events: events.clone(),
                    },
                );
                DeviceEvent::DeviceOpened {
                    camera_id: camera_id.to_string(),
                    handle,
                }
            }
        };

        info!(camera = camera_id, "Virtual camera opening");
        emit_sequence(events, vec![event], behavior.open_delay);
        Ok(())
    }

    fn close(&self, handle: DeviceHandle) {
        let mut state = self.state();
        state.calls.push(VirtualCall::Close {
            camera_id: handle.camera_id().to_string(),
        });
        state.open.remove(&handle.id());
        let stale: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.handle == handle.id())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(session) = state.sessions.remove(&id) {
                stop_pump(&session);
            }
        }
        debug!(camera = handle.camera_id(), "Virtual camera closed");
    }

    fn create_session(
        &self,
        handle: &DeviceHandle,
        session: Uuid,
        targets: &[Surface],
    ) -> BackendResult<()> {
        let behavior = self.behavior();
        let mut state = self.state();
        state.calls.push(VirtualCall::CreateSession {
            session,
            kinds: targets.iter().map(|s| s.kind).collect(),
        });

        let events = state
            .open
            .get(&handle.id())
            .map(|o| o.events.clone())
            .ok_or_else(|| BackendError::Closed(format!("camera {} is closed", handle.camera_id())))?;
        if targets.is_empty() {
            return Err(BackendError::InvalidRequest("session has no targets".into()));
        }

        // A new session invalidates the previous one on the same camera
        let previous: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.handle == handle.id())
            .map(|(id, _)| *id)
            .collect();
        for id in previous {
            if let Some(old) = state.sessions.remove(&id) {
                stop_pump(&old);
            }
        }

        let event = if behavior.fail_recorder_sessions
            && targets.iter().any(|s| s.kind == SurfaceKind::Recorder)
        {
            DeviceEvent::SessionConfigFailed {
                session,
                reason: "recorder surface rejected".into(),
            }
        } else {
            state.sessions.insert(
                session,
                SessionRecord {
                    handle: handle.id(),
                    surfaces: targets.to_vec(),
                    pump: None,
                },
            );
            DeviceEvent::SessionConfigured { session }
        };
        drop(state);

        emit_sequence(events, vec![event], behavior.configure_delay);
        Ok(())
    }

    fn close_session(&self, session: Uuid) {
        let mut state = self.state();
        state.calls.push(VirtualCall::CloseSession { session });
        if let Some(record) = state.sessions.remove(&session) {
            stop_pump(&record);
        }
    }

    fn set_repeating(&self, session: Uuid, request: &CaptureRequest) -> BackendResult<()> {
        let interval = self.behavior().frame_interval;
        let mut state = self.state();
        state.calls.push(VirtualCall::SetRepeating {
            session,
            request: request.clone(),
        });

        let record = state
            .sessions
            .get_mut(&session)
            .ok_or_else(|| BackendError::Closed(format!("session {} is not active", session)))?;
        if let Some(missing) = request
            .targets
            .iter()
            .find(|id| !record.surfaces.iter().any(|s| s.id == **id))
        {
            return Err(BackendError::InvalidRequest(format!(
                "surface {} is not part of the session",
                missing
            )));
        }
        stop_pump(record);

        let streams: Vec<Surface> = record
            .surfaces
            .iter()
            .filter(|s| s.frames.is_some() && request.targets.contains(&s.id))
            .cloned()
            .collect();
        if streams.is_empty() {
            record.pump = None;
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        record.pump = Some(Arc::clone(&running));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                for surface in &streams {
                    let format = match surface.kind {
                        SurfaceKind::Recorder => PixelFormat::H264,
                        _ => PixelFormat::NV12,
                    };
                    if let Some(frames) = &surface.frames {
                        // A slow consumer loses frames, like a full buffer queue
                        let _ = frames.try_send(frame_for(surface, &[0u8; 64], format));
                    }
                }
            }
        });
        Ok(())
    }

    fn stop_repeating(&self, session: Uuid) -> BackendResult<()> {
        let mut state = self.state();
        state.calls.push(VirtualCall::StopRepeating { session });
        let record = state
            .sessions
            .get_mut(&session)
            .ok_or_else(|| BackendError::Closed(format!("session {} is not active", session)))?;
        stop_pump(record);
        record.pump = None;
        Ok(())
    }

    fn capture(&self, session: Uuid, request: &CaptureRequest) -> BackendResult<()> {
        self.state().calls.push(VirtualCall::Capture {
            session,
            request: request.clone(),
        });

        let behavior = self.behavior();
        let (events, surfaces) = self.session_events(session)?;
        let targets: Vec<&Surface> = surfaces
            .iter()
            .filter(|s| request.targets.contains(&s.id))
            .collect();
        if targets.len() != request.targets.len() {
            return Err(BackendError::InvalidRequest(
                "request targets a surface outside the session".into(),
            ));
        }

        let rid = request.id;
        let mut script = Vec::new();

        if request.template == RequestTemplate::StillCapture {
            if behavior.fail_still_capture {
                script.push(DeviceEvent::CaptureFailed {
                    session,
                    request: rid,
                    reason: "sensor readout failed".into(),
                });
            } else {
                for surface in targets.iter().filter(|s| s.kind == SurfaceKind::Still) {
                    script.push(DeviceEvent::ImageAvailable {
                        session,
                        surface: surface.id,
                        frame: frame_for(surface, &behavior.still_bytes, PixelFormat::Jpeg),
                    });
                }
                script.push(DeviceEvent::CaptureCompleted {
                    session,
                    request: rid,
                    metadata: self.next_metadata(Some(AfState::FocusedLocked), Some(AeState::Converged)),
                });
            }
        } else if request.af_trigger == AfTrigger::Start {
            if behavior.silent_focus {
                return Ok(());
            }
            let count = behavior.af_response.len();
            for (i, af) in behavior.af_response.iter().enumerate() {
                let metadata = self.next_metadata(*af, behavior.lock_ae_state);
                script.push(if i + 1 == count {
                    DeviceEvent::CaptureCompleted { session, request: rid, metadata }
                } else {
                    DeviceEvent::CaptureProgressed { session, request: rid, metadata }
                });
            }
        } else if request.precapture_trigger == PrecaptureTrigger::Start {
            if behavior.silent_focus {
                return Ok(());
            }
            let count = behavior.precapture_response.len();
            for (i, ae) in behavior.precapture_response.iter().enumerate() {
                let metadata = self.next_metadata(Some(AfState::FocusedLocked), *ae);
                script.push(if i + 1 == count {
                    DeviceEvent::CaptureCompleted { session, request: rid, metadata }
                } else {
                    DeviceEvent::CaptureProgressed { session, request: rid, metadata }
                });
            }
        } else {
            script.push(DeviceEvent::CaptureCompleted {
                session,
                request: rid,
                metadata: self.next_metadata(None, None),
            });
        }

        emit_sequence(events, script, behavior.result_interval);
        Ok(())
    }
}
