// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! Every command drives a [`CameraController`] against the virtual device:
//! - Listing available cameras
//! - Taking photos
//! - Recording videos
//! - Showing the effective configuration

use camera_session::backends::camera::types::{AspectRatio, LensFacing};
use camera_session::backends::camera::{CaptureDevice, VirtualDevice};
use camera_session::constants::format_bitrate;
use camera_session::pipelines::photo::FileStillSink;
use camera_session::pipelines::video::FileVideoSink;
use camera_session::session::{CameraController, ControllerEvent, ControllerOptions};
use camera_session::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How long to wait for any single controller outcome
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// List all available cameras
pub fn list_cameras() -> CliResult<()> {
    let device = VirtualDevice::new();
    let cameras = device.cameras()?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!(
            "  [{}] {} camera, sensor mounted at {}",
            camera.id, camera.facing, camera.sensor_orientation
        );

        let mut sizes = camera.preview_sizes.clone();
        sizes.sort_by_key(|s| std::cmp::Reverse(s.area()));
        let res_strs: Vec<String> = sizes.iter().take(3).map(|s| s.to_string()).collect();
        println!("      Preview: {}", res_strs.join(", "));
        println!(
            "      Flash: {}, auto-focus: {}",
            if camera.flash_available { "yes" } else { "no" },
            if camera.auto_focus_supported() { "yes" } else { "no" }
        );
        println!();
    }

    Ok(())
}

/// Wait until `pick` maps an event to a result
async fn wait_for<T>(
    events: &mut broadcast::Receiver<ControllerEvent>,
    mut pick: impl FnMut(ControllerEvent) -> Option<CliResult<T>>,
) -> CliResult<T> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ControllerEvent::DeviceError { error }) => {
                    return Err(format!("camera failed: {}", error).into());
                }
                Ok(event) => {
                    if let Some(result) = pick(event) {
                        return result;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed controller events");
                }
                Err(RecvError::Closed) => return Err("controller stopped".into()),
            }
        }
    };

    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .map_err(|_| "timed out waiting for the camera")?
}

/// Spawn a controller and bring up its preview
async fn start_preview(
    options: ControllerOptions,
    photo_dir: PathBuf,
    facing: LensFacing,
    ratio: AspectRatio,
) -> CliResult<(CameraController, broadcast::Receiver<ControllerEvent>)> {
    let controller = CameraController::spawn(
        Arc::new(VirtualDevice::new()),
        Arc::new(FileStillSink::new(photo_dir)),
        Box::new(FileVideoSink::new()),
        options,
    )?;
    let mut events = controller.subscribe();

    controller.open(ratio, facing).await?;
    let resolutions = wait_for(&mut events, |event| match event {
        ControllerEvent::Opened { resolutions, .. } => Some(Ok(resolutions)),
        ControllerEvent::SizeWarning(warning) => {
            println!("Warning: {}", warning);
            None
        }
        _ => None,
    })
    .await?;
    wait_for(&mut events, |event| match event {
        ControllerEvent::PreviewStarted { .. } => Some(Ok(())),
        _ => None,
    })
    .await?;

    println!(
        "Preview {} ({}), still {}, video {}",
        resolutions.preview, resolutions.aspect_ratio, resolutions.still, resolutions.video
    );
    Ok((controller, events))
}

/// Take a photo with the selected lens
pub async fn take_photo(
    config: Config,
    facing: Option<LensFacing>,
    ratio: Option<AspectRatio>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    let facing = facing.unwrap_or(config.facing);
    let ratio = ratio.unwrap_or(config.aspect_ratio);
    let photo_dir = output.unwrap_or_else(|| config.photo_dir.clone());
    println!("Using {} camera", facing);

    let (controller, mut events) =
        start_preview(ControllerOptions::from(&config), photo_dir, facing, ratio).await?;

    println!("Capturing...");
    controller.take_still().await?;
    let result = wait_for(&mut events, |event| match event {
        ControllerEvent::FocusTimedOut => {
            println!("Focus did not settle, capturing anyway");
            None
        }
        ControllerEvent::StillSaved { path } => Some(Ok(path)),
        ControllerEvent::StillFailed { error } => Some(Err(error.into())),
        _ => None,
    })
    .await;

    controller.shutdown().await;
    let path = result?;
    println!("Photo saved: {}", path.display());
    Ok(())
}

/// Record a video for `duration` seconds
pub async fn record_video(
    config: Config,
    facing: Option<LensFacing>,
    duration: u64,
    output: Option<PathBuf>,
    enable_audio: bool,
) -> CliResult<()> {
    let facing = facing.unwrap_or(config.facing);
    let mut options = ControllerOptions::from(&config);
    options.audio_enabled = enable_audio;
    if let Some(dir) = output {
        options.video_dir = dir;
    }
    println!("Using {} camera", facing);

    let ratio = config.aspect_ratio;
    let (controller, mut events) =
        start_preview(options, config.photo_dir.clone(), facing, ratio).await?;

    controller.start_recording().await?;
    let path = wait_for(&mut events, |event| match event {
        ControllerEvent::RecordingStarted { path } => Some(Ok(path)),
        ControllerEvent::RecordingFailed { error } => Some(Err(error.into())),
        _ => None,
    })
    .await?;
    let video_size = controller
        .status()
        .resolutions
        .map(|r| r.video)
        .unwrap_or(config.video_ceiling);
    println!(
        "Recording to {} for {}s at {}",
        path.display(),
        duration,
        format_bitrate(config.bitrate_preset.bitrate_kbps(video_size))
    );

    tokio::time::sleep(Duration::from_secs(duration)).await;
    controller.stop_recording().await?;
    let result = wait_for(&mut events, |event| match event {
        ControllerEvent::RecordingSaved { path, bytes } => Some(Ok((path, bytes))),
        ControllerEvent::RecordingDiscarded { reason } => {
            Some(Err(format!("recording discarded: {}", reason).into()))
        }
        ControllerEvent::RecordingFailed { error } => Some(Err(error.into())),
        _ => None,
    })
    .await;

    controller.shutdown().await;
    let (path, bytes) = result?;
    println!("Video saved: {} ({} bytes)", path.display(), bytes);
    Ok(())
}

/// Print the effective configuration, optionally writing it back
pub fn show_config(config: &Config, path: &Path, save: bool) -> CliResult<()> {
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        config.save(path)?;
        println!("Saved.");
    }
    Ok(())
}
