// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session controller

use crate::backends::camera::types::BackendError;
use crate::session::lock::LockTimeout;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias using ControllerError
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Result type alias using PhotoError
pub type PhotoResult<T> = Result<T, PhotoError>;

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Top-level error for the binary and configuration handling
#[derive(Debug, Clone)]
pub enum AppError {
    /// Controller failures
    Controller(ControllerError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Errors reported by the capture session controller
#[derive(Debug, Clone)]
pub enum ControllerError {
    /// The open/close lock could not be taken in time
    LockTimeout(LockTimeout),
    /// The device disconnected or failed; the controller is closed
    DeviceFatal(String),
    /// Operation not valid in the current state
    InvalidState(String),
    /// A still is already pending
    StillInProgress,
    /// Recording already in progress
    AlreadyRecording,
    /// No recording to stop
    NotRecording,
    /// A session could not be configured
    ConfigureFailed(String),
    /// A single request could not be submitted
    CaptureSubmit(String),
    /// Still sink failure
    Photo(PhotoError),
    /// Video sink failure
    Recording(RecordingError),
    /// Synchronous device API failure
    Backend(BackendError),
    /// The worker task is gone
    WorkerStopped,
}

impl ControllerError {
    /// True for the failures that change device availability
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControllerError::LockTimeout(_) | ControllerError::DeviceFatal(_)
        )
    }
}

/// Video sink errors
#[derive(Debug, Clone)]
pub enum RecordingError {
    /// Encoder or output file could not be set up
    PrepareFailed(String),
    /// Failed to start recording
    StartFailed(String),
    /// Failed to stop recording
    StopFailed(String),
    /// Operation needs a prepared recorder
    NotPrepared,
    /// Finished file could not be moved into place
    FinalizeFailed(String),
}

/// Still sink errors
#[derive(Debug, Clone)]
pub enum PhotoError {
    /// No buffer arrived for the capture
    NoFrameAvailable,
    /// Capture failed
    CaptureFailed(String),
    /// Save failed
    SaveFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Controller(e) => write!(f, "Camera error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::LockTimeout(e) => write!(f, "Camera busy: {}", e),
            ControllerError::DeviceFatal(msg) => write!(f, "Camera unavailable: {}", msg),
            ControllerError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            ControllerError::StillInProgress => write!(f, "A photo is already being taken"),
            ControllerError::AlreadyRecording => write!(f, "Recording already in progress"),
            ControllerError::NotRecording => write!(f, "Not recording"),
            ControllerError::ConfigureFailed(msg) => {
                write!(f, "Session configuration failed: {}", msg)
            }
            ControllerError::CaptureSubmit(msg) => write!(f, "Capture request failed: {}", msg),
            ControllerError::Photo(e) => write!(f, "Photo error: {}", e),
            ControllerError::Recording(e) => write!(f, "Recording error: {}", e),
            ControllerError::Backend(e) => write!(f, "Device error: {}", e),
            ControllerError::WorkerStopped => write!(f, "Camera controller has shut down"),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::PrepareFailed(msg) => write!(f, "Failed to prepare recorder: {}", msg),
            RecordingError::StartFailed(msg) => write!(f, "Failed to start recording: {}", msg),
            RecordingError::StopFailed(msg) => write!(f, "Failed to stop recording: {}", msg),
            RecordingError::NotPrepared => write!(f, "Recorder is not prepared"),
            RecordingError::FinalizeFailed(msg) => write!(f, "Failed to finalize video: {}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::NoFrameAvailable => write!(f, "No frame available for capture"),
            PhotoError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ControllerError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for PhotoError {}

impl From<ControllerError> for AppError {
    fn from(err: ControllerError) -> Self {
        AppError::Controller(err)
    }
}

impl From<LockTimeout> for ControllerError {
    fn from(err: LockTimeout) -> Self {
        ControllerError::LockTimeout(err)
    }
}

impl From<BackendError> for ControllerError {
    fn from(err: BackendError) -> Self {
        ControllerError::Backend(err)
    }
}

impl From<RecordingError> for ControllerError {
    fn from(err: RecordingError) -> Self {
        ControllerError::Recording(err)
    }
}

impl From<PhotoError> for ControllerError {
    fn from(err: PhotoError) -> Self {
        ControllerError::Photo(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// Conversions for I/O errors
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(err: std::io::Error) -> Self {
        PhotoError::SaveFailed(err.to_string())
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::PrepareFailed(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
