// SPDX-License-Identifier: GPL-3.0-only

//! Capture request values
//!
//! A request is rebuilt from the current [`RequestSettings`] every time it is
//! submitted instead of being mutated in place, so the preview and still
//! requests can never drift apart through a shared builder.

use super::metering::{FocusRegions, MeteringRegion};
use crate::backends::camera::types::{AfMode, FlashMode, FocusMode, Surface};
use uuid::Uuid;

/// Which hardware template a request starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// AF trigger carried by a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

/// AE precapture trigger carried by a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrecaptureTrigger {
    #[default]
    Idle,
    Start,
}

/// Auto-exposure mode, which also decides when the flash may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AeMode {
    #[default]
    On,
    OnAutoFlash,
    OnAlwaysFlash,
    OnAutoFlashRedEye,
}

/// Direct flash unit control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlashUnit {
    #[default]
    Off,
    Torch,
}

/// Everything a request is derived from
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub flash: FlashMode,
    pub flash_supported: bool,
    pub focus: FocusMode,
    pub auto_focus_supported: bool,
    pub recording: bool,
    /// Set while a tap-to-focus is being held
    pub manual_regions: Option<FocusRegions>,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            flash: FlashMode::default(),
            flash_supported: false,
            focus: FocusMode::Auto,
            auto_focus_supported: false,
            recording: false,
            manual_regions: None,
        }
    }
}

impl RequestSettings {
    /// AE mode and flash unit for the current flash setting
    pub fn flash_controls(&self) -> (AeMode, FlashUnit) {
        if !self.flash_supported {
            return (AeMode::On, FlashUnit::Off);
        }
        match self.flash {
            FlashMode::Off => (AeMode::On, FlashUnit::Off),
            FlashMode::On => (AeMode::OnAlwaysFlash, FlashUnit::Off),
            FlashMode::Torch => (AeMode::On, FlashUnit::Torch),
            FlashMode::Auto => (AeMode::OnAutoFlash, FlashUnit::Off),
            FlashMode::RedEye => (AeMode::OnAutoFlashRedEye, FlashUnit::Off),
        }
    }

    /// AF mode for the repeating request
    pub fn af_mode(&self) -> AfMode {
        if self.manual_regions.is_some() {
            return AfMode::Auto;
        }
        match (self.focus, self.auto_focus_supported) {
            (FocusMode::Auto, true) if self.recording => AfMode::ContinuousVideo,
            (FocusMode::Auto, true) => AfMode::ContinuousPicture,
            _ => AfMode::Off,
        }
    }

    /// Whether a still should lock focus first
    pub fn wants_focus_lock(&self) -> bool {
        self.focus == FocusMode::Auto && self.auto_focus_supported && self.manual_regions.is_none()
    }
}

/// One immutable capture request
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub id: Uuid,
    pub template: RequestTemplate,
    /// Surfaces this request writes to
    pub targets: Vec<Uuid>,
    pub af_mode: AfMode,
    pub af_trigger: AfTrigger,
    pub ae_mode: AeMode,
    pub precapture_trigger: PrecaptureTrigger,
    pub flash_unit: FlashUnit,
    pub af_regions: Vec<MeteringRegion>,
    pub ae_regions: Vec<MeteringRegion>,
    pub video_stabilization: bool,
    /// Clockwise rotation the encoder should record for still output
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    /// Build a request for `targets` from the current settings
    pub fn build(template: RequestTemplate, targets: &[&Surface], settings: &RequestSettings) -> Self {
        let (ae_mode, flash_unit) = settings.flash_controls();
        let (af_regions, ae_regions) = match &settings.manual_regions {
            Some(regions) => (regions.af.clone(), regions.ae.clone()),
            None => (
                vec![MeteringRegion::zero_weight()],
                vec![MeteringRegion::zero_weight()],
            ),
        };

        Self {
            id: Uuid::new_v4(),
            template,
            targets: targets.iter().map(|s| s.id).collect(),
            af_mode: settings.af_mode(),
            af_trigger: AfTrigger::Idle,
            ae_mode,
            precapture_trigger: PrecaptureTrigger::Idle,
            flash_unit,
            af_regions,
            ae_regions,
            video_stabilization: template == RequestTemplate::Record,
            jpeg_orientation: None,
        }
    }

    /// Same parameters with an AF trigger, as a new request
    pub fn with_af_trigger(mut self, trigger: AfTrigger) -> Self {
        self.id = Uuid::new_v4();
        self.af_trigger = trigger;
        self
    }

    /// Same parameters with an AE precapture trigger, as a new request
    pub fn with_precapture_trigger(mut self, trigger: PrecaptureTrigger) -> Self {
        self.id = Uuid::new_v4();
        self.precapture_trigger = trigger;
        self
    }

    /// Same parameters with an output rotation, as a new request
    pub fn with_jpeg_orientation(mut self, degrees: u32) -> Self {
        self.id = Uuid::new_v4();
        self.jpeg_orientation = Some(degrees % 360);
        self
    }

    pub fn targets_surface(&self, surface: &Surface) -> bool {
        self.targets.contains(&surface.id)
    }
}
