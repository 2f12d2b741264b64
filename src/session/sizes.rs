// SPDX-License-Identifier: GPL-3.0-only

//! Output size selection
//!
//! Pure functions choosing the preview, still and video resolutions from the
//! sizes a camera advertises. All area comparisons go through [`Size::area`],
//! which is widened to `u64`.

use crate::backends::camera::types::{
    AspectRatio, CameraCharacteristics, DisplayRotation, SensorRotation, Size,
};
use std::collections::BTreeSet;
use tracing::warn;

/// A degraded preview choice that the caller should surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeWarning {
    /// Nothing matched the requested ratio; the default 4:3 was used instead
    FellBackToDefaultRatio { requested: AspectRatio },
    /// Nothing matched even 4:3; the first advertised size was used
    NoSuitableSize { requested: AspectRatio },
}

impl std::fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeWarning::FellBackToDefaultRatio { requested } => write!(
                f,
                "no preview size for {}, using {}",
                requested,
                AspectRatio::DEFAULT
            ),
            SizeWarning::NoSuitableSize { requested } => {
                write!(f, "couldn't find any suitable preview size for {}", requested)
            }
        }
    }
}

/// Outcome of preview selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSelection {
    pub size: Size,
    /// The ratio actually in effect, which differs from the request after a fallback
    pub aspect_ratio: AspectRatio,
    pub warning: Option<SizeWarning>,
}

/// Largest size with exactly `ratio`, else the largest size overall
pub fn choose_still_size(candidates: &[Size], ratio: AspectRatio) -> Option<Size> {
    candidates
        .iter()
        .filter(|s| s.matches_ratio(ratio))
        .max_by_key(|s| s.area())
        .or_else(|| candidates.iter().max_by_key(|s| s.area()))
        .copied()
}

/// Largest size within the encoder ceiling `max` with exactly `ratio`
///
/// Falls back to the largest size within the ceiling, then to the largest
/// size overall.
pub fn choose_video_size(candidates: &[Size], ratio: AspectRatio, max: Size) -> Option<Size> {
    let mut within: Vec<Size> = candidates
        .iter()
        .copied()
        .filter(|s| s.fits_within(max))
        .collect();
    within.sort_by_key(|s| std::cmp::Reverse(s.area()));

    within
        .iter()
        .find(|s| s.matches_ratio(ratio))
        .or_else(|| within.first())
        .copied()
        .or_else(|| candidates.iter().max_by_key(|s| s.area()).copied())
}

fn search_preview(candidates: &[Size], view: Size, max: Size, ratio: AspectRatio) -> Option<Size> {
    let mut big_enough = Vec::new();
    let mut not_big_enough = Vec::new();

    for size in candidates
        .iter()
        .filter(|s| s.fits_within(max) && s.matches_ratio(ratio))
    {
        if size.width >= view.width && size.height >= view.height {
            big_enough.push(*size);
        } else {
            not_big_enough.push(*size);
        }
    }

    // Smallest that covers the view keeps bus bandwidth down
    big_enough
        .iter()
        .min_by_key(|s| s.area())
        .or_else(|| not_big_enough.iter().max_by_key(|s| s.area()))
        .copied()
}

/// Pick the preview size for a view of `view` pixels, bounded by `max`
///
/// Prefers the smallest matching size at least as large as the view, else the
/// largest matching size smaller than it. When nothing matches, retries once
/// with 4:3, then degrades to the first candidate. Returns `None` only for an
/// empty candidate list.
pub fn choose_preview_size(
    candidates: &[Size],
    view: Size,
    max: Size,
    ratio: AspectRatio,
) -> Option<PreviewSelection> {
    let first = *candidates.first()?;

    if let Some(size) = search_preview(candidates, view, max, ratio) {
        return Some(PreviewSelection {
            size,
            aspect_ratio: ratio,
            warning: None,
        });
    }

    if ratio != AspectRatio::DEFAULT
        && let Some(size) = search_preview(candidates, view, max, AspectRatio::DEFAULT)
    {
        warn!(requested = %ratio, size = %size, "No preview size for ratio, falling back to 4:3");
        return Some(PreviewSelection {
            size,
            aspect_ratio: AspectRatio::DEFAULT,
            warning: Some(SizeWarning::FellBackToDefaultRatio { requested: ratio }),
        });
    }

    warn!(requested = %ratio, size = %first, "Couldn't find any suitable preview size");
    Some(PreviewSelection {
        size: first,
        aspect_ratio: first.aspect_ratio().unwrap_or(AspectRatio::DEFAULT),
        warning: Some(SizeWarning::NoSuitableSize { requested: ratio }),
    })
}

/// Ratios offered by preview sizes within `max`
pub fn supported_aspect_ratios(candidates: &[Size], max: Size) -> BTreeSet<AspectRatio> {
    candidates
        .iter()
        .filter(|s| s.fits_within(max))
        .filter_map(|s| s.aspect_ratio())
        .collect()
}

/// View and cap sizes expressed in sensor orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewBounds {
    pub view: Size,
    pub max: Size,
}

/// Whether sensor-space sizes are transposed relative to the display
pub fn dimensions_swapped(sensor: SensorRotation, display: DisplayRotation) -> bool {
    match display {
        DisplayRotation::Rotation0 | DisplayRotation::Rotation180 => sensor.swaps_dimensions(),
        DisplayRotation::Rotation90 | DisplayRotation::Rotation270 => !sensor.swaps_dimensions(),
    }
}

/// Bring the view and display sizes into sensor orientation and cap the display at `max_preview`
pub fn preview_bounds(
    view: Size,
    display_size: Size,
    sensor: SensorRotation,
    display: DisplayRotation,
    max_preview: Size,
) -> PreviewBounds {
    let (view, display_size) = if dimensions_swapped(sensor, display) {
        (view.swapped(), display_size.swapped())
    } else {
        (view, display_size)
    };

    PreviewBounds {
        view,
        max: Size::new(
            display_size.width.min(max_preview.width),
            display_size.height.min(max_preview.height),
        ),
    }
}

/// Preview, video and still sizes chosen for one open/reconfigure cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTriple {
    pub preview: Size,
    pub video: Size,
    pub still: Size,
    /// Ratio in effect after any preview fallback
    pub aspect_ratio: AspectRatio,
}

/// Inputs to [`select_resolutions`]
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest {
    pub aspect_ratio: AspectRatio,
    pub view: Size,
    pub display_size: Size,
    pub display_rotation: DisplayRotation,
    pub max_preview: Size,
    pub video_ceiling: Size,
}

/// Full selection for one camera
///
/// Returns `None` when the camera advertises no sizes for some surface.
pub fn select_resolutions(
    camera: &CameraCharacteristics,
    request: &SelectionRequest,
) -> Option<(ResolutionTriple, Option<SizeWarning>)> {
    let bounds = preview_bounds(
        request.view,
        request.display_size,
        camera.sensor_orientation,
        request.display_rotation,
        request.max_preview,
    );
    let preview = choose_preview_size(
        &camera.preview_sizes,
        bounds.view,
        bounds.max,
        request.aspect_ratio,
    )?;
    // Video and still follow whatever ratio the preview ended up with
    let video = choose_video_size(&camera.video_sizes, preview.aspect_ratio, request.video_ceiling)?;
    let still = choose_still_size(&camera.still_sizes, preview.aspect_ratio)?;

    Some((
        ResolutionTriple {
            preview: preview.size,
            video,
            still,
            aspect_ratio: preview.aspect_ratio,
        },
        preview.warning,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|(w, h)| Size::new(*w, *h)).collect()
    }

    const FHD: Size = Size::new(1920, 1080);

    #[test]
    fn test_still_prefers_matching_ratio() {
        let c = sizes(&[(4000, 3000), (1920, 1080), (1280, 720)]);
        assert_eq!(choose_still_size(&c, AspectRatio::DEFAULT), Some(Size::new(4000, 3000)));
        assert_eq!(choose_still_size(&c, AspectRatio::WIDE), Some(Size::new(1920, 1080)));
    }

    #[test]
    fn test_still_falls_back_to_largest() {
        let c = sizes(&[(1280, 720), (4000, 3000), (1920, 1080)]);
        let square = AspectRatio::new(1, 1).unwrap();
        assert_eq!(choose_still_size(&c, square), Some(Size::new(4000, 3000)));
        assert_eq!(choose_still_size(&[], square), None);
    }

    #[test]
    fn test_video_respects_ceiling() {
        let c = sizes(&[(3840, 2160), (1920, 1080), (1440, 1080), (1280, 720)]);
        assert_eq!(choose_video_size(&c, AspectRatio::WIDE, FHD), Some(Size::new(1920, 1080)));
        assert_eq!(choose_video_size(&c, AspectRatio::DEFAULT, FHD), Some(Size::new(1440, 1080)));
    }

    #[test]
    fn test_video_fallbacks() {
        // No ratio match within ceiling: largest within ceiling
        let c = sizes(&[(3840, 2160), (1280, 720), (640, 360)]);
        assert_eq!(choose_video_size(&c, AspectRatio::DEFAULT, FHD), Some(Size::new(1280, 720)));

        // Nothing within ceiling: largest overall
        let c = sizes(&[(2560, 1440), (3840, 2160)]);
        assert_eq!(choose_video_size(&c, AspectRatio::WIDE, FHD), Some(Size::new(3840, 2160)));
    }

    #[test]
    fn test_video_never_exceeds_ceiling_when_possible() {
        let c = sizes(&[(4096, 3072), (3840, 2160), (1920, 1440), (800, 600), (320, 240)]);
        for ratio in [AspectRatio::DEFAULT, AspectRatio::WIDE] {
            let chosen = choose_video_size(&c, ratio, FHD).unwrap();
            assert!(chosen.fits_within(FHD), "{} exceeds ceiling", chosen);
            assert!(c.contains(&chosen));
        }
    }

    #[test]
    fn test_preview_smallest_big_enough() {
        let c = sizes(&[(1920, 1440), (1440, 1080), (1280, 960), (640, 480), (1920, 1080)]);
        let pick = choose_preview_size(&c, Size::new(1200, 900), FHD, AspectRatio::DEFAULT).unwrap();
        assert_eq!(pick.size, Size::new(1280, 960));
        assert_eq!(pick.warning, None);
    }

    #[test]
    fn test_preview_largest_not_big_enough() {
        let c = sizes(&[(1920, 1440), (640, 480), (1280, 960)]);
        let view = Size::new(2000, 1500);
        let pick = choose_preview_size(&c, view, FHD, AspectRatio::DEFAULT).unwrap();
        // 1920x1440 exceeds the 1080 max height
        assert_eq!(pick.size, Size::new(1280, 960));
    }

    #[test]
    fn test_preview_falls_back_to_default_ratio() {
        let c = sizes(&[(1280, 960), (640, 480)]);
        let pick = choose_preview_size(&c, Size::new(1280, 720), FHD, AspectRatio::WIDE).unwrap();
        assert_eq!(pick.aspect_ratio, AspectRatio::DEFAULT);
        assert_eq!(
            pick.warning,
            Some(SizeWarning::FellBackToDefaultRatio {
                requested: AspectRatio::WIDE
            })
        );
        assert!(c.contains(&pick.size));
    }

    #[test]
    fn test_preview_degrades_to_first_candidate() {
        let c = sizes(&[(1000, 1000), (500, 500)]);
        let pick = choose_preview_size(&c, Size::new(800, 600), FHD, AspectRatio::WIDE).unwrap();
        assert_eq!(pick.size, Size::new(1000, 1000));
        assert_eq!(pick.aspect_ratio, AspectRatio::new(1, 1).unwrap());
        assert!(matches!(pick.warning, Some(SizeWarning::NoSuitableSize { .. })));
        assert!(choose_preview_size(&[], Size::new(1, 1), FHD, AspectRatio::WIDE).is_none());
    }

    #[test]
    fn test_selected_sizes_come_from_candidates() {
        let c = sizes(&[(4032, 3024), (3840, 2160), (1920, 1080), (1440, 1080), (1280, 720), (640, 480)]);
        let views = [Size::new(1080, 1920), Size::new(720, 1280), Size::new(3000, 3000)];
        for ratio in [AspectRatio::DEFAULT, AspectRatio::WIDE] {
            for view in views {
                assert!(c.contains(&choose_preview_size(&c, view, FHD, ratio).unwrap().size));
                assert!(c.contains(&choose_video_size(&c, ratio, FHD).unwrap()));
                assert!(c.contains(&choose_still_size(&c, ratio).unwrap()));
            }
        }
    }

    #[test]
    fn test_supported_ratios() {
        let c = sizes(&[(1920, 1080), (1280, 720), (1440, 1080), (4000, 3000)]);
        let ratios = supported_aspect_ratios(&c, FHD);
        assert_eq!(
            ratios.into_iter().collect::<Vec<_>>(),
            vec![AspectRatio::DEFAULT, AspectRatio::WIDE]
        );
    }

    #[test]
    fn test_preview_bounds_swap_for_portrait_phone() {
        let bounds = preview_bounds(
            Size::new(1080, 1920),
            Size::new(1080, 2340),
            SensorRotation::Rotate90,
            DisplayRotation::Rotation0,
            FHD,
        );
        assert_eq!(bounds.view, Size::new(1920, 1080));
        assert_eq!(bounds.max, Size::new(1920, 1080));

        let bounds = preview_bounds(
            Size::new(1920, 1080),
            Size::new(1280, 720),
            SensorRotation::Rotate90,
            DisplayRotation::Rotation90,
            FHD,
        );
        assert_eq!(bounds.view, Size::new(1920, 1080));
        assert_eq!(bounds.max, Size::new(1280, 720));
    }
}
