// SPDX-License-Identifier: GPL-3.0-only

//! Metering regions for tap-to-focus
//!
//! A tap arrives in normalized view coordinates. It is rotated by the display
//! rotation, mapped into sensor orientation, then scaled into the sensor's
//! active array where the AF/AE routines expect their regions.

use crate::backends::camera::types::{DisplayRotation, SensorRotation, Size};

/// Highest weight a metering region may carry
pub const METERING_WEIGHT_MAX: u32 = 1000;

/// Side of the AF box as a fraction of the shorter active-array side
pub const AF_REGION_BOX: f32 = 0.2;

/// Side of the AE box as a fraction of the shorter active-array side
pub const AE_REGION_BOX: f32 = 0.3;

/// Rectangle in active-array pixels with a metering weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeteringRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: u32,
}

impl MeteringRegion {
    /// A region the device ignores, which resets metering to its default
    pub const fn zero_weight() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            weight: 0,
        }
    }
}

/// AF and AE regions computed for one tap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRegions {
    pub af: Vec<MeteringRegion>,
    pub ae: Vec<MeteringRegion>,
}

/// Rotate a normalized view point clockwise about the view centre
fn rotate_view_point(x: f32, y: f32, rotation: DisplayRotation) -> (f32, f32) {
    match rotation {
        DisplayRotation::Rotation0 => (x, y),
        DisplayRotation::Rotation90 => (1.0 - y, x),
        DisplayRotation::Rotation180 => (1.0 - x, 1.0 - y),
        DisplayRotation::Rotation270 => (y, 1.0 - x),
    }
}

/// Map a normalized display point into normalized sensor coordinates
fn display_to_sensor(x: f32, y: f32, sensor: SensorRotation) -> (f32, f32) {
    match sensor {
        SensorRotation::None => (x, y),
        SensorRotation::Rotate90 => (y, 1.0 - x),
        SensorRotation::Rotate180 => (1.0 - x, 1.0 - y),
        SensorRotation::Rotate270 => (1.0 - y, x),
    }
}

fn region_around(nx: f32, ny: f32, fraction: f32, active_array: Size) -> MeteringRegion {
    let short_side = active_array.width.min(active_array.height) as f32;
    let half = (short_side * fraction / 2.0).max(1.0);
    let cx = nx * active_array.width as f32;
    let cy = ny * active_array.height as f32;

    let max_x = active_array.width as f32;
    let max_y = active_array.height as f32;
    let left = (cx - half).clamp(0.0, max_x).round() as u32;
    let top = (cy - half).clamp(0.0, max_y).round() as u32;
    let right = (cx + half).clamp(0.0, max_x).round() as u32;
    let bottom = (cy + half).clamp(0.0, max_y).round() as u32;

    MeteringRegion {
        x: left,
        y: top,
        width: right.saturating_sub(left),
        height: bottom.saturating_sub(top),
        weight: METERING_WEIGHT_MAX,
    }
}

/// Build AF/AE regions for a tap at normalized view coordinates `(x, y)`
pub fn regions_for_tap(
    x: f32,
    y: f32,
    display: DisplayRotation,
    sensor: SensorRotation,
    active_array: Size,
) -> FocusRegions {
    let x = x.clamp(0.0, 1.0);
    let y = y.clamp(0.0, 1.0);
    let (dx, dy) = rotate_view_point(x, y, display);
    let (sx, sy) = display_to_sensor(dx, dy, sensor);

    FocusRegions {
        af: vec![region_around(sx, sy, AF_REGION_BOX, active_array)],
        ae: vec![region_around(sx, sy, AE_REGION_BOX, active_array)],
    }
}
