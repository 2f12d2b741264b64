// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture device seam

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Frame data storage
///
/// Buffers are reference counted so a delivered image can be handed to a sink
/// without copying, while the device is free to recycle its own slot.
#[derive(Clone)]
pub enum FrameData {
    /// Bytes owned by this frame
    Copied(Arc<[u8]>),
}

impl FrameData {
    /// Wrap a byte vector
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(bytes))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Output resolution of a surface or sensor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, widened so 100+ MP sensors cannot overflow
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Same size with width and height exchanged
    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// True when `width / height == ratio.x / ratio.y` exactly
    pub fn matches_ratio(&self, ratio: AspectRatio) -> bool {
        u64::from(self.width) * u64::from(ratio.y) == u64::from(self.height) * u64::from(ratio.x)
    }

    /// True when both dimensions fit inside `bound`
    pub fn fits_within(&self, bound: Size) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }

    /// The reduced aspect ratio of this size, if it has no zero dimension
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Width-to-height ratio, always stored in lowest terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    x: u32,
    y: u32,
}

impl AspectRatio {
    /// 4:3, used when nothing else matches
    pub const DEFAULT: AspectRatio = AspectRatio { x: 4, y: 3 };
    /// 16:9
    pub const WIDE: AspectRatio = AspectRatio { x: 16, y: 9 };

    /// Build a ratio, reducing it. Returns `None` for a zero term.
    pub fn new(x: u32, y: u32) -> Option<Self> {
        if x == 0 || y == 0 {
            return None;
        }
        let d = gcd(x, y);
        Some(Self { x: x / d, y: y / d })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// The ratio with its terms exchanged (portrait <-> landscape)
    pub fn inverse(&self) -> Self {
        Self {
            x: self.y,
            y: self.x,
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected \"x:y\", got {:?}", s))?;
        let x = x
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad ratio term {:?}: {}", x, e))?;
        let y = y
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad ratio term {:?}: {}", y, e))?;
        AspectRatio::new(x, y).ok_or_else(|| format!("ratio {:?} has a zero term", s))
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(ratio: AspectRatio) -> Self {
        ratio.to_string()
    }
}

/// Which way the lens points relative to the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// Rear camera, facing away from the user
    #[default]
    Back,
    /// Selfie camera, facing the user
    Front,
}

impl LensFacing {
    /// The other lens
    pub fn flipped(self) -> Self {
        match self {
            LensFacing::Back => LensFacing::Front,
            LensFacing::Front => LensFacing::Back,
        }
    }
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Back => write!(f, "back"),
            LensFacing::Front => write!(f, "front"),
        }
    }
}

impl FromStr for LensFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "rear" => Ok(LensFacing::Back),
            "front" => Ok(LensFacing::Front),
            other => Err(format!("unknown lens facing {:?}", other)),
        }
    }
}

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Flash never fires
    Off,
    /// Flash fires on every still
    On,
    /// Flash LED stays lit
    Torch,
    /// Flash fires when the exposure routine asks for it
    #[default]
    Auto,
    /// Auto flash with red-eye reduction pre-flash
    RedEye,
}

impl FlashMode {
    /// Cycle to the next mode: Off -> Auto -> On -> Torch -> RedEye -> Off
    pub fn next(self) -> Self {
        match self {
            FlashMode::Off => FlashMode::Auto,
            FlashMode::Auto => FlashMode::On,
            FlashMode::On => FlashMode::Torch,
            FlashMode::Torch => FlashMode::RedEye,
            FlashMode::RedEye => FlashMode::Off,
        }
    }
}

/// Whether the controller drives auto-focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    #[default]
    Auto,
    Off,
}

/// Sensor rotation in degrees (clockwise)
///
/// The fixed angle between the sensor's native readout orientation and the
/// device's natural orientation. Phone sensors are usually mounted at 90° or 270°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Current rotation of the UI relative to the device's natural orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub const ALL: [DisplayRotation; 4] = [
        DisplayRotation::Rotation0,
        DisplayRotation::Rotation90,
        DisplayRotation::Rotation180,
        DisplayRotation::Rotation270,
    ];

    /// Parse one of 0/90/180/270
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(DisplayRotation::Rotation0),
            90 => Some(DisplayRotation::Rotation90),
            180 => Some(DisplayRotation::Rotation180),
            270 => Some(DisplayRotation::Rotation270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }

    /// True for the landscape rotations
    pub fn is_sideways(&self) -> bool {
        matches!(
            self,
            DisplayRotation::Rotation90 | DisplayRotation::Rotation270
        )
    }
}

/// Autofocus state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfState {
    #[default]
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

impl AfState {
    /// The lens has finished a triggered scan, successfully or not
    pub fn is_locked(&self) -> bool {
        matches!(self, AfState::FocusedLocked | AfState::NotFocusedLocked)
    }
}

/// Auto exposure state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AeState {
    #[default]
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

/// Per-frame metadata delivered with every capture result
///
/// Devices that do not report a field leave it `None`; the focus protocol
/// treats a missing AF or AE state as "nothing to wait for".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    /// Frame sequence number
    pub sequence: Option<u64>,
    /// Focus status
    pub af_state: Option<AfState>,
    /// Auto exposure state
    pub ae_state: Option<AeState>,
    /// Actual exposure time applied (microseconds)
    pub exposure_time: Option<u64>,
    /// Lens position (for AF cameras)
    pub lens_position: Option<f32>,
}

/// Encoding of the bytes carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Compressed still image
    Jpeg,
    /// Semi-planar 4:2:0, what preview and encoder surfaces receive
    NV12,
    /// Already-encoded video access unit
    H264,
}

/// A single buffer produced by the device
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub format: PixelFormat,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
    /// Sensor timestamp in nanoseconds
    pub sensor_timestamp_ns: Option<u64>,
}

/// Frame sender for a surface that receives a stream of buffers
pub type FrameSender = tokio::sync::mpsc::Sender<CameraFrame>;

/// Frame receiver paired with [`FrameSender`]
pub type FrameReceiver = tokio::sync::mpsc::Receiver<CameraFrame>;

/// What an output surface is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Preview,
    Still,
    Recorder,
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceKind::Preview => write!(f, "preview"),
            SurfaceKind::Still => write!(f, "still"),
            SurfaceKind::Recorder => write!(f, "recorder"),
        }
    }
}

/// An output target a session can be bound to
///
/// Still surfaces hand their buffers back through `DeviceEvent::ImageAvailable`;
/// preview and recorder surfaces may carry a frame channel the device feeds directly.
#[derive(Debug, Clone)]
pub struct Surface {
    pub id: Uuid,
    pub kind: SurfaceKind,
    pub size: Size,
    /// Maximum number of outstanding buffers the consumer may hold
    pub max_images: usize,
    pub frames: Option<FrameSender>,
}

impl Surface {
    pub fn new(kind: SurfaceKind, size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            size,
            max_images: 1,
            frames: None,
        }
    }

    pub fn with_frames(mut self, frames: FrameSender) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images.max(1);
        self
    }
}

/// Auto-focus modes a camera can advertise and a request can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AfMode {
    Off,
    /// Single scan on trigger, used for tap-to-focus
    Auto,
    #[default]
    ContinuousPicture,
    ContinuousVideo,
    Macro,
}

/// Static description of one camera exposed by the device
#[derive(Debug, Clone)]
pub struct CameraCharacteristics {
    pub id: String,
    pub facing: LensFacing,
    pub sensor_orientation: SensorRotation,
    /// Sensor active pixel array, the coordinate space for metering regions
    pub active_array: Size,
    /// Sizes the preview surface may take
    pub preview_sizes: Vec<Size>,
    /// Sizes the still (JPEG) surface may take
    pub still_sizes: Vec<Size>,
    /// Sizes the video encoder surface may take
    pub video_sizes: Vec<Size>,
    pub af_modes: Vec<AfMode>,
    pub flash_available: bool,
}

impl CameraCharacteristics {
    /// Auto-focus is usable unless the camera only offers `Off` (or nothing)
    pub fn auto_focus_supported(&self) -> bool {
        !(self.af_modes.is_empty() || self.af_modes.iter().all(|m| *m == AfMode::Off))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera device not found
    DeviceNotFound(String),
    /// The device is in use by another client
    DeviceBusy(String),
    /// The device handle or session is closed or stale
    Closed(String),
    /// Hardware or service failure
    Hardware(String),
    /// The request references a surface the session was not configured with
    InvalidRequest(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::Closed(msg) => write!(f, "Closed: {}", msg),
            BackendError::Hardware(msg) => write!(f, "Hardware error: {}", msg),
            BackendError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_is_reduced() {
        let ratio = AspectRatio::new(1920, 1080).unwrap();
        assert_eq!(ratio, AspectRatio::WIDE);
        assert_eq!(ratio.to_string(), "16:9");
        assert!(AspectRatio::new(0, 3).is_none());
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("4:3".parse::<AspectRatio>().unwrap(), AspectRatio::DEFAULT);
        assert_eq!(" 8 : 6 ".parse::<AspectRatio>().unwrap(), AspectRatio::DEFAULT);
        assert!("43".parse::<AspectRatio>().is_err());
        assert!("4:0".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_size_ratio_match_is_exact() {
        assert!(Size::new(4000, 3000).matches_ratio(AspectRatio::DEFAULT));
        assert!(!Size::new(1920, 1088).matches_ratio(AspectRatio::WIDE));
        assert!(Size::new(1920, 1080).matches_ratio(AspectRatio::WIDE));
    }

    #[test]
    fn test_area_does_not_overflow() {
        let huge = Size::new(u32::MAX, u32::MAX);
        assert_eq!(huge.area(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_sensor_rotation_normalises() {
        assert_eq!(SensorRotation::from_degrees_int(-90), SensorRotation::Rotate270);
        assert_eq!(SensorRotation::from_degrees_int(450), SensorRotation::Rotate90);
        assert!(SensorRotation::Rotate270.swaps_dimensions());
    }

    #[test]
    fn test_auto_focus_support() {
        let mut cam = CameraCharacteristics {
            id: "0".into(),
            facing: LensFacing::Back,
            sensor_orientation: SensorRotation::Rotate90,
            active_array: Size::new(4000, 3000),
            preview_sizes: vec![],
            still_sizes: vec![],
            video_sizes: vec![],
            af_modes: vec![AfMode::Off],
            flash_available: false,
        };
        assert!(!cam.auto_focus_supported());
        cam.af_modes.clear();
        assert!(!cam.auto_focus_supported());
        cam.af_modes = vec![AfMode::Off, AfMode::ContinuousPicture];
        assert!(cam.auto_focus_supported());
    }
}
