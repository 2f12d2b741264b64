// SPDX-License-Identifier: GPL-3.0-only

//! File-backed video sink
//!
//! Frames pushed into the recorder surface are appended to a `.part` file by a
//! background task. `finalize` renames it to the requested output path;
//! `discard` deletes it.

use super::{VideoSink, VideoSinkConfig};
use crate::backends::camera::types::{FrameReceiver, Surface, SurfaceKind};
use crate::constants::limits::RECORDER_QUEUE;
use crate::errors::{RecordingError, RecordingResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Prepared {
    config: VideoSinkConfig,
    partial_path: PathBuf,
    frames: Option<FrameReceiver>,
}

struct Running {
    stop: oneshot::Sender<()>,
    writer: JoinHandle<RecordingResult<u64>>,
}

/// Records the surface stream into a file
#[derive(Default)]
pub struct FileVideoSink {
    prepared: Option<Prepared>,
    running: Option<Running>,
    /// Set once `stop` has run
    stopped: bool,
}

impl FileVideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn partial_path(output: &std::path::Path) -> PathBuf {
        let mut name = output.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }
}

async fn write_frames(
    path: PathBuf,
    mut frames: FrameReceiver,
    mut stop: oneshot::Receiver<()>,
) -> RecordingResult<u64> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .await
        .map_err(|e| RecordingError::StartFailed(format!("{}: {}", path.display(), e)))?;
    let mut written = 0u64;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    file.write_all(frame.data.as_ref())
                        .await
                        .map_err(|e| RecordingError::StopFailed(e.to_string()))?;
                    written += frame.data.len() as u64;
                }
                None => break,
            },
        }
    }

    file.flush()
        .await
        .map_err(|e| RecordingError::StopFailed(e.to_string()))?;
    Ok(written)
}

#[async_trait]
impl VideoSink for FileVideoSink {
    async fn prepare(&mut self, config: &VideoSinkConfig) -> RecordingResult<Surface> {
        if let Some(parent) = config.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial_path = Self::partial_path(&config.output_path);
        tokio::fs::File::create(&partial_path).await.map_err(|e| {
            RecordingError::PrepareFailed(format!("{}: {}", partial_path.display(), e))
        })?;

        let (tx, rx) = mpsc::channel(RECORDER_QUEUE);
        info!(
            output = %config.output_path.display(),
            size = %config.size,
            orientation = config.orientation_hint,
            audio = ?config.audio_source,
            bitrate_kbps = config.bitrate_kbps,
            framerate = config.framerate,
            "Video sink prepared"
        );

        self.prepared = Some(Prepared {
            config: config.clone(),
            partial_path,
            frames: Some(rx),
        });
        self.stopped = false;
        Ok(Surface::new(SurfaceKind::Recorder, config.size).with_frames(tx))
    }

    async fn start(&mut self) -> RecordingResult<()> {
        let prepared = self.prepared.as_mut().ok_or(RecordingError::NotPrepared)?;
        let frames = prepared
            .frames
            .take()
            .ok_or_else(|| RecordingError::StartFailed("recorder already started".into()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let writer = tokio::spawn(write_frames(prepared.partial_path.clone(), frames, stop_rx));
        self.running = Some(Running {
            stop: stop_tx,
            writer,
        });
        debug!("Video sink started");
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<u64> {
        self.stopped = true;
        let running = self
            .running
            .take()
            .ok_or_else(|| RecordingError::StopFailed("recorder was never started".into()))?;
        let _ = running.stop.send(());

        let written = running
            .writer
            .await
            .map_err(|e| RecordingError::StopFailed(format!("writer task: {}", e)))??;
        debug!(bytes = written, "Video sink stopped");
        Ok(written)
    }

    async fn finalize(&mut self) -> RecordingResult<PathBuf> {
        let prepared = self.prepared.as_ref().ok_or(RecordingError::NotPrepared)?;
        if !self.stopped {
            return Err(RecordingError::FinalizeFailed("recorder still running".into()));
        }
        let output = prepared.config.output_path.clone();
        tokio::fs::rename(&prepared.partial_path, &output)
            .await
            .map_err(|e| RecordingError::FinalizeFailed(format!("{}: {}", output.display(), e)))?;
        info!(path = %output.display(), "Video saved");
        Ok(output)
    }

    async fn discard(&mut self) {
        if let Some(prepared) = &self.prepared {
            match tokio::fs::remove_file(&prepared.partial_path).await {
                Ok(()) => debug!(path = %prepared.partial_path.display(), "Discarded recording"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %prepared.partial_path.display(), error = %e, "Failed to discard recording"),
            }
        }
    }

    async fn release(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(());
            let _ = running.writer.await;
        }
        self.prepared = None;
        self.stopped = false;
    }
}
