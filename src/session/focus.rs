// SPDX-License-Identifier: GPL-3.0-only

//! Focus and exposure convergence before a still
//!
//! The controller feeds every capture result it receives while a still is
//! pending into [`next_step`] and acts on the returned [`FocusStep`]. Keeping
//! the decision pure lets the whole AF/AE protocol be tested without a device.

use crate::backends::camera::types::{AeState, FrameMetadata};

/// Where the still-capture protocol currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Live preview, nothing pending
    #[default]
    Preview,
    /// AF trigger sent, waiting for the lens to lock
    LockingFocus,
    /// AE precapture trigger sent, waiting for metering to start
    Precapturing,
    /// Waiting for the precapture sequence to finish
    WaitingExposureSettle,
    /// Still request submitted
    Capturing,
}

impl CaptureState {
    /// States in which capture results drive the protocol
    pub fn is_converging(&self) -> bool {
        matches!(
            self,
            CaptureState::LockingFocus
                | CaptureState::Precapturing
                | CaptureState::WaitingExposureSettle
        )
    }
}

/// What the controller should do after a capture result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusStep {
    /// Keep the current state and wait for the next result
    Wait,
    /// Move to `Precapturing` and submit an AE precapture trigger
    StartPrecapture,
    /// Move to `WaitingExposureSettle`
    AwaitExposureSettle,
    /// Take the still now
    CaptureStill,
}

/// Decide the next protocol step for `state` given one capture result
pub fn next_step(state: CaptureState, metadata: &FrameMetadata) -> FocusStep {
    match state {
        CaptureState::LockingFocus => match metadata.af_state {
            None => exposure_step(metadata.ae_state),
            Some(af) if af.is_locked() => exposure_step(metadata.ae_state),
            Some(_) => FocusStep::Wait,
        },
        CaptureState::Precapturing => match metadata.ae_state {
            None | Some(AeState::Precapture) | Some(AeState::FlashRequired) => {
                FocusStep::AwaitExposureSettle
            }
            Some(_) => FocusStep::Wait,
        },
        CaptureState::WaitingExposureSettle => match metadata.ae_state {
            Some(AeState::Precapture) => FocusStep::Wait,
            _ => FocusStep::CaptureStill,
        },
        CaptureState::Preview | CaptureState::Capturing => FocusStep::Wait,
    }
}

fn exposure_step(ae: Option<AeState>) -> FocusStep {
    match ae {
        None | Some(AeState::Converged) => FocusStep::CaptureStill,
        Some(_) => FocusStep::StartPrecapture,
    }
}
