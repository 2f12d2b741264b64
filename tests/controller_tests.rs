// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session controller
//!
//! Everything runs against the virtual device on a paused clock, so device
//! delays and focus timeouts elapse instantly and in a fixed order.

use async_trait::async_trait;
use camera_session::backends::camera::types::{
    AeState, AfMode, AspectRatio, BackendError, CameraFrame, FlashMode, FocusMode, LensFacing, Size,
    Surface, SurfaceKind,
};
use camera_session::backends::camera::{
    DeviceFault, OpenFailure, VirtualBehavior, VirtualCall, VirtualDevice,
};
use camera_session::errors::{ControllerError, PhotoResult, RecordingResult};
use camera_session::pipelines::photo::StillSink;
use camera_session::pipelines::video::{AudioSource, VideoSink, VideoSinkConfig};
use camera_session::session::request::{
    AfTrigger, CaptureRequest, FlashUnit, PrecaptureTrigger, RequestTemplate,
};
use camera_session::session::{
    CameraController, CaptureState, ControllerEvent, ControllerOptions, ControllerStatus,
    DeviceState,
};
use camera_session::BitratePreset;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

#[derive(Default)]
struct StillLog {
    /// (bytes, rotation) per delivered still
    delivered: Vec<(usize, u32)>,
    released: Vec<Uuid>,
}

struct MemoryStillSink {
    log: Arc<Mutex<StillLog>>,
}

#[async_trait]
impl StillSink for MemoryStillSink {
    async fn deliver(&self, frame: CameraFrame, rotation: u32) -> PhotoResult<PathBuf> {
        let mut log = self.log.lock().unwrap();
        log.delivered.push((frame.data.len(), rotation));
        Ok(PathBuf::from(format!("memory/photo_{}.jpg", log.delivered.len())))
    }

    fn release_target(&self, surface: Uuid) {
        self.log.lock().unwrap().released.push(surface);
    }
}

struct VideoLog {
    calls: Vec<&'static str>,
    config: Option<VideoSinkConfig>,
    /// What `stop` reports as written
    bytes: u64,
}

struct MemoryVideoSink {
    log: Arc<Mutex<VideoLog>>,
}

#[async_trait]
impl VideoSink for MemoryVideoSink {
    async fn prepare(&mut self, config: &VideoSinkConfig) -> RecordingResult<Surface> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("prepare");
        log.config = Some(config.clone());
        Ok(Surface::new(SurfaceKind::Recorder, config.size))
    }

    async fn start(&mut self) -> RecordingResult<()> {
        self.log.lock().unwrap().calls.push("start");
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<u64> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("stop");
        Ok(log.bytes)
    }

    async fn finalize(&mut self) -> RecordingResult<PathBuf> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("finalize");
        Ok(log
            .config
            .as_ref()
            .map(|c| c.output_path.clone())
            .unwrap_or_default())
    }

    async fn discard(&mut self) {
        self.log.lock().unwrap().calls.push("discard");
    }

    async fn release(&mut self) {
        self.log.lock().unwrap().calls.push("release");
    }
}

struct Harness {
    controller: CameraController,
    device: Arc<VirtualDevice>,
    stills: Arc<Mutex<StillLog>>,
    video: Arc<Mutex<VideoLog>>,
    events: broadcast::Receiver<ControllerEvent>,
}

fn harness(behavior: VirtualBehavior) -> Harness {
    let device = Arc::new(VirtualDevice::with_behavior(behavior));
    let stills = Arc::new(Mutex::new(StillLog::default()));
    let video = Arc::new(Mutex::new(VideoLog {
        calls: Vec::new(),
        config: None,
        bytes: 4096,
    }));
    let options = ControllerOptions {
        video_dir: PathBuf::from("/tmp/camera-session-tests"),
        ..ControllerOptions::default()
    };

    let controller = CameraController::spawn(
        device.clone(),
        Arc::new(MemoryStillSink {
            log: Arc::clone(&stills),
        }),
        Box::new(MemoryVideoSink {
            log: Arc::clone(&video),
        }),
        options,
    )
    .unwrap();
    let events = controller.subscribe();

    Harness {
        controller,
        device,
        stills,
        video,
        events,
    }
}

async fn expect_event<T>(
    events: &mut broadcast::Receiver<ControllerEvent>,
    mut pick: impl FnMut(&ControllerEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(value) = pick(&event) {
                        return value;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("controller event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("timed out waiting for controller event")
}

async fn wait_status(controller: &CameraController, pred: impl FnMut(&ControllerStatus) -> bool) {
    let mut status = controller.watch_status();
    tokio::time::timeout(Duration::from_secs(30), status.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

async fn open_preview(h: &mut Harness, facing: LensFacing) {
    h.controller.open(AspectRatio::DEFAULT, facing).await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::PreviewStarted { .. }).then_some(())
    })
    .await;
}

fn last_repeating(device: &VirtualDevice) -> CaptureRequest {
    device
        .calls()
        .into_iter()
        .rev()
        .find_map(|call| match call {
            VirtualCall::SetRepeating { request, .. } => Some(request),
            _ => None,
        })
        .expect("no repeating request submitted")
}

fn captures(device: &VirtualDevice) -> Vec<CaptureRequest> {
    device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            VirtualCall::Capture { request, .. } => Some(request),
            _ => None,
        })
        .collect()
}

fn session_kinds(device: &VirtualDevice) -> Vec<Vec<SurfaceKind>> {
    device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            VirtualCall::CreateSession { kinds, .. } => Some(kinds),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_open_starts_preview_session() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    let status = h.controller.status();
    assert_eq!(status.device, DeviceState::Open);
    assert_eq!(status.camera_id.as_deref(), Some("0"));
    assert!(status.session.is_some());
    assert!(status.session_configured);
    assert_eq!(status.capture, CaptureState::Preview);
    assert!(!h.controller.is_device_lock_held());

    assert!(h.controller.is_flash_supported());
    assert!(h.controller.is_facing_switch_supported());
    let ratios = h.controller.supported_aspect_ratios();
    assert!(ratios.contains(&AspectRatio::DEFAULT));
    assert!(ratios.contains(&AspectRatio::WIDE));

    assert_eq!(
        session_kinds(&h.device),
        vec![vec![SurfaceKind::Preview, SurfaceKind::Still]]
    );
    let repeating = last_repeating(&h.device);
    assert_eq!(repeating.template, RequestTemplate::Preview);
    assert_eq!(repeating.af_mode, AfMode::ContinuousPicture);
}

#[tokio::test(start_paused = true)]
async fn test_open_while_open_is_rejected() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    let result = h.controller.open(AspectRatio::DEFAULT, LensFacing::Back).await;
    assert!(matches!(result, Err(ControllerError::InvalidState(_))));
    assert!(!h.controller.is_device_lock_held());
    assert_eq!(h.device.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lock_held_until_open_callback() {
    let mut h = harness(VirtualBehavior::default());

    h.controller
        .open(AspectRatio::DEFAULT, LensFacing::Back)
        .await
        .unwrap();
    assert!(h.controller.is_device_lock_held());
    assert_eq!(h.controller.status().device, DeviceState::Opening);

    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::Opened { .. }).then_some(())
    })
    .await;
    assert!(!h.controller.is_device_lock_held());
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_open_failure_releases_lock() {
    let h = harness(VirtualBehavior {
        open_failure: Some(OpenFailure::Immediate(BackendError::DeviceBusy("0".into()))),
        ..Default::default()
    });

    let result = h.controller.open(AspectRatio::DEFAULT, LensFacing::Back).await;
    assert!(matches!(
        result,
        Err(ControllerError::Backend(BackendError::DeviceBusy(_)))
    ));
    assert!(!h.controller.is_device_lock_held());
    assert_eq!(h.controller.status().device, DeviceState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_asynchronous_open_failure_releases_lock() {
    let mut h = harness(VirtualBehavior {
        open_failure: Some(OpenFailure::Callback(DeviceFault::Disconnected)),
        ..Default::default()
    });

    h.controller
        .open(AspectRatio::DEFAULT, LensFacing::Back)
        .await
        .unwrap();
    let error = expect_event(&mut h.events, |e| match e {
        ControllerEvent::DeviceError { error } => Some(error.clone()),
        _ => None,
    })
    .await;

    assert!(error.is_fatal());
    assert!(!h.controller.is_device_lock_held());
    let status = h.controller.status();
    assert_eq!(status.device, DeviceState::Closed);
    assert!(status.session.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_close_then_reopen() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.close().await.unwrap();
    let status = h.controller.status();
    assert_eq!(status.device, DeviceState::Closed);
    assert!(status.session.is_none());
    assert!(status.camera_id.is_none());
    assert_eq!(h.device.open_count(), 0);
    assert_eq!(h.device.session_count(), 0);
    assert_eq!(h.stills.lock().unwrap().released.len(), 1);
    assert!(!h.controller.is_device_lock_held());

    open_preview(&mut h, LensFacing::Back).await;
    assert_eq!(h.controller.status().device, DeviceState::Open);
    assert_eq!(h.device.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_still_locks_focus_then_captures() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.take_still().await.unwrap();
    let path = expect_event(&mut h.events, |e| match e {
        ControllerEvent::StillSaved { path } => Some(path.clone()),
        _ => None,
    })
    .await;
    assert!(path.starts_with("memory"));
    wait_status(&h.controller, |s| {
        !s.still_pending && s.capture == CaptureState::Preview
    })
    .await;

    let requests = captures(&h.device);
    assert_eq!(requests[0].af_trigger, AfTrigger::Start);
    let still = requests
        .iter()
        .find(|r| r.template == RequestTemplate::StillCapture)
        .expect("no still request");
    // Rear sensor at 90°, display upright
    assert_eq!(still.jpeg_orientation, Some(90));
    assert!(requests.iter().any(|r| r.af_trigger == AfTrigger::Cancel));
    assert!(
        h.device
            .calls()
            .iter()
            .any(|c| matches!(c, VirtualCall::StopRepeating { .. }))
    );

    let log = h.stills.lock().unwrap();
    assert_eq!(log.delivered.len(), 1);
    assert_eq!(log.delivered[0].1, 90);
}

#[tokio::test(start_paused = true)]
async fn test_second_still_is_rejected_while_pending() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.take_still().await.unwrap();
    let before = h.controller.status().capture;
    assert_eq!(before, CaptureState::LockingFocus);

    let second = h.controller.take_still().await;
    assert!(matches!(second, Err(ControllerError::StillInProgress)));
    assert_eq!(h.controller.status().capture, before);

    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::StillSaved { .. }).then_some(())
    })
    .await;
    assert_eq!(h.stills.lock().unwrap().delivered.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_focus_timeout_captures_anyway() {
    let mut h = harness(VirtualBehavior {
        silent_focus: true,
        ..Default::default()
    });
    open_preview(&mut h, LensFacing::Back).await;

    let started = tokio::time::Instant::now();
    h.controller.take_still().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::FocusTimedOut).then_some(())
    })
    .await;
    assert!(started.elapsed() >= Duration::from_millis(800));

    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::StillSaved { .. }).then_some(())
    })
    .await;
    assert_eq!(h.stills.lock().unwrap().delivered.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unconverged_exposure_runs_precapture() {
    let mut h = harness(VirtualBehavior {
        lock_ae_state: Some(AeState::Searching),
        ..Default::default()
    });
    open_preview(&mut h, LensFacing::Back).await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let mut status = h.controller.watch_status();
    let seen = Arc::clone(&states);
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let capture = status.borrow_and_update().capture;
            let mut seen = seen.lock().unwrap();
            if seen.last() != Some(&capture) {
                seen.push(capture);
            }
        }
    });

    h.controller.take_still().await.unwrap();
    let timed_out = expect_event(&mut h.events, |e| match e {
        ControllerEvent::FocusTimedOut => Some(true),
        ControllerEvent::StillSaved { .. } => Some(false),
        _ => None,
    })
    .await;
    assert!(!timed_out);
    wait_status(&h.controller, |s| {
        !s.still_pending && s.capture == CaptureState::Preview
    })
    .await;

    let requests = captures(&h.device);
    let precaptures = requests
        .iter()
        .filter(|r| r.precapture_trigger == PrecaptureTrigger::Start)
        .count();
    assert_eq!(precaptures, 1);
    let precapture = requests
        .iter()
        .position(|r| r.precapture_trigger == PrecaptureTrigger::Start)
        .unwrap();
    let still = requests
        .iter()
        .position(|r| r.template == RequestTemplate::StillCapture)
        .expect("no still request");
    assert!(precapture < still);

    let states = states.lock().unwrap().clone();
    let expected = [
        CaptureState::Precapturing,
        CaptureState::WaitingExposureSettle,
        CaptureState::Capturing,
    ];
    let positions: Vec<usize> = expected
        .iter()
        .map(|state| {
            states
                .iter()
                .position(|s| s == state)
                .unwrap_or_else(|| panic!("never entered {:?}: {:?}", state, states))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", states);

    assert_eq!(h.stills.lock().unwrap().delivered.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_focus_camera_skips_focus_lock() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Front).await;
    assert!(!h.controller.is_flash_supported());

    h.controller.take_still().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::StillSaved { .. }).then_some(())
    })
    .await;

    let requests = captures(&h.device);
    assert!(requests.iter().all(|r| r.af_trigger != AfTrigger::Start));
    let still = requests
        .iter()
        .find(|r| r.template == RequestTemplate::StillCapture)
        .expect("no still request");
    // Front sensor at 270°, display upright
    assert_eq!(still.jpeg_orientation, Some(270));
}

#[tokio::test(start_paused = true)]
async fn test_still_capture_failure_restores_preview() {
    let mut h = harness(VirtualBehavior {
        fail_still_capture: true,
        ..Default::default()
    });
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.take_still().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::StillFailed { .. }).then_some(())
    })
    .await;

    let status = h.controller.status();
    assert!(!status.still_pending);
    assert_eq!(status.capture, CaptureState::Preview);
    assert_eq!(status.device, DeviceState::Open);
    // Preview was resumed after the failure
    assert_eq!(last_repeating(&h.device).template, RequestTemplate::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_still_rejected_when_closed() {
    let h = harness(VirtualBehavior::default());
    let result = h.controller.take_still().await;
    assert!(matches!(result, Err(ControllerError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_recording_round_trip() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.start_recording().await.unwrap();
    let path = expect_event(&mut h.events, |e| match e {
        ControllerEvent::RecordingStarted { path } => Some(path.clone()),
        _ => None,
    })
    .await;
    assert!(h.controller.is_recording());
    assert!(path.starts_with("/tmp/camera-session-tests"));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));

    {
        let log = h.video.lock().unwrap();
        assert_eq!(log.calls, vec!["prepare", "start"]);
        let config = log.config.as_ref().unwrap();
        assert_eq!(config.orientation_hint, 90);
        assert_eq!(config.audio_source, AudioSource::Microphone);
        assert_eq!(config.framerate, 30);
        assert_eq!(
            config.bitrate_kbps,
            BitratePreset::Medium.bitrate_kbps(config.size)
        );
        assert!(config.size.width <= 1920 && config.size.height <= 1080);
    }
    let repeating = last_repeating(&h.device);
    assert_eq!(repeating.template, RequestTemplate::Record);
    assert_eq!(repeating.af_mode, AfMode::ContinuousVideo);
    assert!(repeating.video_stabilization);
    assert_eq!(
        session_kinds(&h.device).last().unwrap(),
        &vec![SurfaceKind::Preview, SurfaceKind::Recorder]
    );

    h.controller.stop_recording().await.unwrap();
    assert!(!h.controller.is_recording());
    let (saved, bytes) = expect_event(&mut h.events, |e| match e {
        ControllerEvent::RecordingSaved { path, bytes } => Some((path.clone(), *bytes)),
        _ => None,
    })
    .await;
    assert_eq!(saved, path);
    assert_eq!(bytes, 4096);
    assert_eq!(
        h.video.lock().unwrap().calls,
        vec!["prepare", "start", "stop", "finalize", "release"]
    );

    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::PreviewStarted { .. }).then_some(())
    })
    .await;
    assert_eq!(
        session_kinds(&h.device).last().unwrap(),
        &vec![SurfaceKind::Preview, SurfaceKind::Still]
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_recording_while_recording_is_rejected() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.start_recording().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingStarted { .. }).then_some(())
    })
    .await;
    let sessions_before = session_kinds(&h.device).len();

    let second = h.controller.start_recording().await;
    assert!(matches!(second, Err(ControllerError::AlreadyRecording)));
    assert!(h.controller.is_recording());
    assert_eq!(h.video.lock().unwrap().calls, vec!["prepare", "start"]);
    assert_eq!(session_kinds(&h.device).len(), sessions_before);
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording_is_discarded() {
    let mut h = harness(VirtualBehavior::default());
    h.video.lock().unwrap().bytes = 0;
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.start_recording().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingStarted { .. }).then_some(())
    })
    .await;

    h.controller.stop_recording().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingDiscarded { .. }).then_some(())
    })
    .await;

    let calls = h.video.lock().unwrap().calls.clone();
    assert!(calls.contains(&"discard"));
    assert!(!calls.contains(&"finalize"));
    assert!(!h.controller.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_recording() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    let result = h.controller.stop_recording().await;
    assert!(matches!(result, Err(ControllerError::NotRecording)));
    assert!(h.video.lock().unwrap().calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recorder_session_failure_falls_back_to_preview() {
    let mut h = harness(VirtualBehavior {
        fail_recorder_sessions: true,
        ..Default::default()
    });
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.start_recording().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingFailed { .. }).then_some(())
    })
    .await;
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::PreviewStarted { .. }).then_some(())
    })
    .await;

    assert!(!h.controller.is_recording());
    assert_eq!(h.video.lock().unwrap().calls, vec!["prepare", "release"]);
    let status = h.controller.status();
    assert_eq!(status.device, DeviceState::Open);
    assert!(status.session_configured);
}

#[tokio::test(start_paused = true)]
async fn test_close_while_recording_finishes_recording() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.start_recording().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingStarted { .. }).then_some(())
    })
    .await;

    h.controller.close().await.unwrap();
    assert!(!h.controller.is_recording());
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::RecordingSaved { .. }).then_some(())
    })
    .await;
    assert_eq!(h.device.open_count(), 0);

    // Session and device go before the recorder
    let calls = h.device.calls();
    let closed = calls
        .iter()
        .position(|c| matches!(c, VirtualCall::Close { .. }))
        .unwrap();
    assert!(
        calls[..closed]
            .iter()
            .any(|c| matches!(c, VirtualCall::CloseSession { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_flash_and_focus_resubmit_repeating_request() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.set_flash(FlashMode::Torch).await.unwrap();
    assert_eq!(last_repeating(&h.device).flash_unit, FlashUnit::Torch);
    assert_eq!(h.controller.status().flash, FlashMode::Torch);

    h.controller.set_focus_mode(FocusMode::Off).await.unwrap();
    assert_eq!(last_repeating(&h.device).af_mode, AfMode::Off);

    // With auto-focus off the still goes straight to capture
    h.controller.take_still().await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::StillSaved { .. }).then_some(())
    })
    .await;
    assert!(
        captures(&h.device)
            .iter()
            .all(|r| r.af_trigger != AfTrigger::Start)
    );
}

#[tokio::test(start_paused = true)]
async fn test_facing_switch_reopens_device() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;
    h.controller.set_flash(FlashMode::On).await.unwrap();

    h.controller.set_facing(LensFacing::Front).await.unwrap();
    expect_event(&mut h.events, |e| {
        matches!(e, ControllerEvent::Closed).then_some(())
    })
    .await;
    let camera = expect_event(&mut h.events, |e| match e {
        ControllerEvent::Opened { camera_id, .. } => Some(camera_id.clone()),
        _ => None,
    })
    .await;
    assert_eq!(camera, "1");

    let status = h.controller.status();
    assert_eq!(status.facing, LensFacing::Front);
    assert_eq!(status.flash, FlashMode::On);
    assert!(!h.controller.is_device_lock_held());
    assert_eq!(h.device.open_count(), 1);

    // Same facing again is a no-op
    let opens = h.device.calls().len();
    h.controller.set_facing(LensFacing::Front).await.unwrap();
    assert_eq!(h.device.calls().len(), opens);
}

#[tokio::test(start_paused = true)]
async fn test_aspect_ratio_changes() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    assert!(!h.controller.set_aspect_ratio(AspectRatio::DEFAULT).await.unwrap());
    let square = AspectRatio::new(1, 1).unwrap();
    assert!(!h.controller.set_aspect_ratio(square).await.unwrap());

    assert!(h.controller.set_aspect_ratio(AspectRatio::WIDE).await.unwrap());
    let resolutions = expect_event(&mut h.events, |e| match e {
        ControllerEvent::Opened { resolutions, .. } => Some(*resolutions),
        _ => None,
    })
    .await;
    assert_eq!(resolutions.aspect_ratio, AspectRatio::WIDE);
    assert!(resolutions.still.matches_ratio(AspectRatio::WIDE));
    assert!(resolutions.video.fits_within(Size::new(1920, 1080)));
}

#[tokio::test(start_paused = true)]
async fn test_device_fault_closes_controller() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.device.inject_fault(DeviceFault::Error(4));
    let error = expect_event(&mut h.events, |e| match e {
        ControllerEvent::DeviceError { error } => Some(error.clone()),
        _ => None,
    })
    .await;
    assert!(matches!(error, ControllerError::DeviceFatal(_)));

    let status = h.controller.status();
    assert_eq!(status.device, DeviceState::Closed);
    assert!(status.session.is_none());

    // No automatic reopen, but a caller can open again
    assert_eq!(h.device.open_count(), 0);
    open_preview(&mut h, LensFacing::Back).await;
}

#[tokio::test(start_paused = true)]
async fn test_tap_to_focus_holds_then_resumes() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.focus_at(0.25, 0.75).await.unwrap();
    assert!(h.controller.status().manual_focus);
    let held = last_repeating(&h.device);
    assert_eq!(held.af_mode, AfMode::Auto);
    assert!(held.af_regions.iter().any(|r| r.weight > 0));
    assert!(
        captures(&h.device)
            .iter()
            .any(|r| r.af_trigger == AfTrigger::Start)
    );

    wait_status(&h.controller, |s| !s.manual_focus).await;
    let resumed = last_repeating(&h.device);
    assert_eq!(resumed.af_mode, AfMode::ContinuousPicture);
    assert!(resumed.af_regions.iter().all(|r| r.weight == 0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_everything() {
    let mut h = harness(VirtualBehavior::default());
    open_preview(&mut h, LensFacing::Back).await;

    h.controller.shutdown().await;
    assert_eq!(h.device.open_count(), 0);
    assert_eq!(h.device.session_count(), 0);
    assert!(matches!(
        h.controller.take_still().await,
        Err(ControllerError::WorkerStopped)
    ));
}
