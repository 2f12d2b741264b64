// SPDX-License-Identifier: GPL-3.0-only

//! Output rotation
//!
//! Combines the sensor mount angle, the current display rotation and the lens
//! facing into the clockwise rotation consumers must apply to output buffers.

use crate::backends::camera::types::{DisplayRotation, LensFacing, SensorRotation};

/// Display rotation to recorder hint for sensors mounted at 90°
const DEFAULT_ORIENTATIONS: [(DisplayRotation, u32); 4] = [
    (DisplayRotation::Rotation0, 90),
    (DisplayRotation::Rotation90, 0),
    (DisplayRotation::Rotation180, 270),
    (DisplayRotation::Rotation270, 180),
];

/// Display rotation to recorder hint for sensors mounted at 270°
const INVERSE_ORIENTATIONS: [(DisplayRotation, u32); 4] = [
    (DisplayRotation::Rotation0, 270),
    (DisplayRotation::Rotation90, 180),
    (DisplayRotation::Rotation180, 90),
    (DisplayRotation::Rotation270, 0),
];

fn lookup(table: &[(DisplayRotation, u32); 4], display: DisplayRotation) -> u32 {
    table
        .iter()
        .find(|(rotation, _)| *rotation == display)
        .map(|(_, degrees)| *degrees)
        .unwrap_or(0)
}

/// Clockwise rotation for still output
///
/// The display rotation is first turned into a device orientation (the device
/// rotated the opposite way to keep the UI upright), which is added to the
/// mount angle. Both lenses resolve to `(mount - display + 360) % 360`.
pub fn resolve(sensor: SensorRotation, display: DisplayRotation, facing: LensFacing) -> u32 {
    let mount = sensor.degrees();
    let device_orientation = (360 - display.degrees()) % 360;

    match facing {
        // Mirroring of front-lens output is left to consumers.
        LensFacing::Back | LensFacing::Front => (mount + device_orientation) % 360,
    }
}

/// Orientation hint handed to the video sink
pub fn video_orientation_hint(
    sensor: SensorRotation,
    display: DisplayRotation,
    facing: LensFacing,
) -> u32 {
    match sensor {
        SensorRotation::Rotate90 => lookup(&DEFAULT_ORIENTATIONS, display),
        SensorRotation::Rotate270 => lookup(&INVERSE_ORIENTATIONS, display),
        _ => resolve(sensor, display, facing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSORS: [SensorRotation; 4] = [
        SensorRotation::None,
        SensorRotation::Rotate90,
        SensorRotation::Rotate180,
        SensorRotation::Rotate270,
    ];

    #[test]
    fn test_rear_lens_scenario() {
        assert_eq!(
            resolve(SensorRotation::Rotate90, DisplayRotation::Rotation0, LensFacing::Back),
            90
        );
    }

    #[test]
    fn test_front_lens_scenario() {
        assert_eq!(
            resolve(SensorRotation::Rotate270, DisplayRotation::Rotation0, LensFacing::Front),
            270
        );
    }

    #[test]
    fn test_rear_lens_matches_table_form() {
        for sensor in SENSORS {
            for display in DisplayRotation::ALL {
                let table = lookup(&DEFAULT_ORIENTATIONS, display);
                let expected = (sensor.degrees() + table + 270) % 360;
                assert_eq!(
                    resolve(sensor, display, LensFacing::Back),
                    expected,
                    "sensor {} display {:?}",
                    sensor,
                    display
                );
            }
        }
    }

    #[test]
    fn test_front_lens_subtracts_display_rotation() {
        for sensor in SENSORS {
            for display in DisplayRotation::ALL {
                assert_eq!(
                    resolve(sensor, display, LensFacing::Front),
                    (sensor.degrees() + 360 - display.degrees()) % 360,
                    "sensor {} display {:?}",
                    sensor,
                    display
                );
            }
        }
    }

    #[test]
    fn test_front_lens_at_quarter_turns() {
        let resolved = |display| resolve(SensorRotation::Rotate270, display, LensFacing::Front);
        assert_eq!(resolved(DisplayRotation::Rotation90), 180);
        assert_eq!(resolved(DisplayRotation::Rotation180), 90);
        assert_eq!(resolved(DisplayRotation::Rotation270), 0);

        let resolved = |display| resolve(SensorRotation::None, display, LensFacing::Front);
        assert_eq!(resolved(DisplayRotation::Rotation90), 270);
        assert_eq!(resolved(DisplayRotation::Rotation270), 90);
    }

    #[test]
    fn test_result_in_range_and_stable() {
        for sensor in SENSORS {
            for display in DisplayRotation::ALL {
                for facing in [LensFacing::Back, LensFacing::Front] {
                    let first = resolve(sensor, display, facing);
                    assert!(first < 360);
                    assert_eq!(first, resolve(sensor, display, facing));
                    assert!(video_orientation_hint(sensor, display, facing) < 360);
                }
            }
        }
    }

    #[test]
    fn test_video_hint_tables() {
        let hints: Vec<u32> = DisplayRotation::ALL
            .iter()
            .map(|d| video_orientation_hint(SensorRotation::Rotate90, *d, LensFacing::Back))
            .collect();
        assert_eq!(hints, vec![90, 0, 270, 180]);

        let hints: Vec<u32> = DisplayRotation::ALL
            .iter()
            .map(|d| video_orientation_hint(SensorRotation::Rotate270, *d, LensFacing::Front))
            .collect();
        assert_eq!(hints, vec![270, 180, 90, 0]);
    }
}
