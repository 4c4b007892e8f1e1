use tracing::{debug, warn};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::common::{GuardStats, Rect};
use crate::color_pipeline::image::MultiPlaneImage;

/// Measured and reference white per plane, plus any guarded divisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationReport {
    pub measured: Vec<f32>,
    pub reference: Vec<f32>,
    pub guard: GuardStats,
}

/// Median of the samples inside `rect`, via selection rather than a full sort.
///
/// For an even sample count the upper median is returned.
pub fn median_in_rect(plane: &[f32], width: usize, rect: Rect) -> Result<f32> {
    let height = if width == 0 { 0 } else { plane.len() / width };
    rect.check_within(width, height)?;

    let mut values: Vec<f32> = rect.indices(width).map(|i| plane[i]).collect();
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    Ok(*median)
}

/// Median white sample of every plane over `rect`.
pub fn measure_white(image: &MultiPlaneImage<f32>, rect: Rect) -> Result<Vec<f32>> {
    image
        .planes()
        .iter()
        .map(|plane| median_in_rect(plane, image.width(), rect))
        .collect()
}

/// Scales `plane` by `reference / measured` so the measured white maps to
/// the reference value. A zero measurement zeroes the plane.
pub fn normalize_plane(plane: &mut [f32], measured: f32, reference: f32) -> GuardStats {
    if measured == 0.0 {
        warn!(reference, "Reference white measured as 0, plane zeroed");
        plane.fill(0.0);
        return GuardStats {
            flat_field_zeros: 0,
            white_point_zeros: 1,
        };
    }
    let factor = measured / reference;
    plane.iter_mut().for_each(|v| *v /= factor);
    GuardStats::default()
}

/// Normalizes every plane against the median of the reference-white patch.
pub fn normalize_to_white(
    image: &mut MultiPlaneImage<f32>,
    rect: Rect,
    reference_white: &[f32],
) -> Result<NormalizationReport> {
    let measured = measure_white(image, rect)?;
    let guard = normalize_with_measured(image, &measured, reference_white)?;
    debug!(?measured, "White point normalized");
    Ok(NormalizationReport {
        measured,
        reference: reference_white.to_vec(),
        guard,
    })
}

/// Normalizes every plane with caller-supplied measured and reference whites.
pub fn normalize_with_measured(
    image: &mut MultiPlaneImage<f32>,
    measured: &[f32],
    reference_white: &[f32],
) -> Result<GuardStats> {
    let count = image.plane_count();
    if measured.len() != count || reference_white.len() != count {
        return Err(ColorError::OutOfRange {
            index: count.saturating_sub(1),
            count: measured.len().min(reference_white.len()),
        });
    }

    let mut guard = GuardStats::default();
    for ((plane, &m), &r) in image.planes_mut().iter_mut().zip(measured).zip(reference_white) {
        guard += normalize_plane(plane, m, r);
    }
    Ok(guard)
}

/// Scales each plane so its robust peak (maximum of the 3x3 median-filtered
/// plane) becomes 1. Returns the peaks.
pub fn normalize_to_peak(image: &mut MultiPlaneImage<f32>) -> Result<Vec<f32>> {
    let (width, height) = image.dimensions();
    let mut peaks = Vec::with_capacity(image.plane_count());
    for plane in image.planes_mut() {
        let peak = median_blur_3x3(plane, width, height)
            .into_iter()
            .fold(f32::MIN, f32::max);
        normalize_plane(plane, peak, 1.0);
        peaks.push(peak);
    }
    Ok(peaks)
}

/// 3x3 median filter with replicated borders.
pub fn median_blur_3x3(plane: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; plane.len()];
    let mut window = [0.0f32; 9];
    for y in 0..height {
        for x in 0..width {
            let mut n = 0;
            for dy in [-1isize, 0, 1] {
                for dx in [-1isize, 0, 1] {
                    let sy = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                    let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                    window[n] = plane[sy * width + sx];
                    n += 1;
                }
            }
            window.sort_unstable_by(f32::total_cmp);
            out[y * width + x] = window[4];
        }
    }
    out
}
