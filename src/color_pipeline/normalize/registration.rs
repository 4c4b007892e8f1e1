//! Two-target registration
//!
//! Each target is a small patch holding a non-repeating pattern (concentric
//! rings work well; periodic patterns make the correlation peak ambiguous).
//! The difference between the two target offsets gives a scale estimate, the
//! plane is scaled about its center, and the residual offset of target 0 is
//! folded into the translation. Rotation is not estimated, so this only
//! corrects axial/scale drift plus shift between bands.

use tracing::{debug, instrument};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::common::Rect;
use crate::color_pipeline::image::MultiPlaneImage;
use crate::color_pipeline::normalize::phase_correlation::{phase_correlate, PhaseOffset};
use crate::color_pipeline::normalize::warp::{warp_plane, SimilarityTransform};

/// Adaptive threshold block size (pixels, odd).
const THRESHOLD_BLOCK: usize = 11;
/// Adaptive threshold offset subtracted from the local mean.
const THRESHOLD_OFFSET: f32 = 2.0;
/// Gaussian sigma for an 11-pixel block: 0.3 * ((11 - 1) / 2 - 1) + 0.8.
const THRESHOLD_SIGMA: f32 = 2.0;

/// Exactly two registration target rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTargets {
    targets: [Rect; 2],
}

impl RegistrationTargets {
    pub fn new(targets: &[Rect]) -> Result<Self> {
        let [first, second] = targets else {
            return Err(ColorError::RegistrationTargetCountInvalid(targets.len()));
        };
        let (cx, cy) = first.center();
        if (cx, cy) == second.center() {
            return Err(ColorError::DegenerateTargets(cx, cy));
        }
        Ok(Self {
            targets: [*first, *second],
        })
    }

    pub fn first(&self) -> Rect {
        self.targets[0]
    }

    pub fn second(&self) -> Rect {
        self.targets[1]
    }

    pub fn as_slice(&self) -> &[Rect] {
        &self.targets
    }

    pub fn check_within(&self, width: usize, height: usize) -> Result<()> {
        self.targets
            .iter()
            .try_for_each(|t| t.check_within(width, height))
    }

    /// Distance between the two target centers.
    pub fn separation(&self) -> f32 {
        let (x0, y0) = self.first().center();
        let (x1, y1) = self.second().center();
        ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
    }
}

impl TryFrom<&[Rect]> for RegistrationTargets {
    type Error = ColorError;

    fn try_from(targets: &[Rect]) -> Result<Self> {
        Self::new(targets)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationOptions {
    /// Stretch each target patch to 0..255 and binarize it with an adaptive
    /// Gaussian threshold before correlating.
    pub binarize_targets: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            binarize_targets: true,
        }
    }
}

/// Outcome of registering one plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Registration {
    pub offset_center: PhaseOffset,
    pub offset_corner: PhaseOffset,
    pub residual: PhaseOffset,
    pub transform: SimilarityTransform,
}

/// `r' / r`: the distance between target centers after applying the
/// differential displacement, over the undeformed distance.
pub fn estimate_scale(
    targets: &RegistrationTargets,
    offset_center: &PhaseOffset,
    offset_corner: &PhaseOffset,
) -> f32 {
    let delta_x = offset_corner.dx - offset_center.dx;
    let delta_y = offset_corner.dy - offset_center.dy;

    let (x0, y0) = targets.first().center();
    let (x1, y1) = targets.second().center();
    let r = targets.separation();
    let r_prime = ((x1 - x0 + delta_x).powi(2) + (y1 - y0 + delta_y).powi(2)).sqrt();
    r_prime / r
}

/// Aligns `source` to `reference` in place.
#[instrument(skip_all, fields(width, height))]
pub fn register_plane(
    source: &mut [f32],
    reference: &[f32],
    width: usize,
    height: usize,
    targets: &RegistrationTargets,
    options: &RegistrationOptions,
) -> Result<Registration> {
    let expected = width * height;
    if source.len() != expected || reference.len() != expected {
        return Err(ColorError::ShapeMismatch {
            expected: (width, height),
            found: (source.len().min(reference.len()), 1),
        });
    }
    targets.check_within(width, height)?;

    let t0 = targets.first();
    let t1 = targets.second();
    let target0 = prepare_patch(reference, width, t0, options);
    let target1 = prepare_patch(reference, width, t1, options);

    let offset_center = phase_correlate(
        &prepare_patch(source, width, t0, options),
        &target0,
        t0.width,
        t0.height,
    )?;
    let offset_corner = phase_correlate(
        &prepare_patch(source, width, t1, options),
        &target1,
        t1.width,
        t1.height,
    )?;

    let scale = estimate_scale(targets, &offset_center, &offset_corner);
    let scaled_transform = SimilarityTransform::about_center(scale, width, height);
    let scaled = warp_plane(source, width, height, &scaled_transform);

    let residual = phase_correlate(
        &prepare_patch(&scaled, width, t0, options),
        &target0,
        t0.width,
        t0.height,
    )?;
    let transform = scaled_transform.translated(residual.dx, residual.dy);

    let registered = warp_plane(source, width, height, &transform);
    source.copy_from_slice(&registered);

    debug!(
        scale,
        tx = transform.tx,
        ty = transform.ty,
        "Plane registered"
    );
    Ok(Registration {
        offset_center,
        offset_corner,
        residual,
        transform,
    })
}

/// Registers every plane of `image` to plane `reference_band`.
pub fn register_image(
    image: &mut MultiPlaneImage<f32>,
    reference_band: usize,
    targets: &RegistrationTargets,
    options: &RegistrationOptions,
) -> Result<Vec<Registration>> {
    let (width, height) = image.dimensions();
    let reference = image.plane(reference_band)?.to_vec();
    let mut registrations = Vec::with_capacity(image.plane_count());
    for plane in image.planes_mut() {
        registrations.push(register_plane(
            plane, &reference, width, height, targets, options,
        )?);
    }
    Ok(registrations)
}

/// Copies the target patch out of `plane`; the plane itself is never modified.
fn prepare_patch(plane: &[f32], width: usize, rect: Rect, options: &RegistrationOptions) -> Vec<f32> {
    let patch: Vec<f32> = rect.indices(width).map(|i| plane[i]).collect();
    if options.binarize_targets {
        binarize(&patch, rect.width, rect.height)
    } else {
        patch
    }
}

/// Stretch to 0..255 by the patch maximum, then adaptive Gaussian threshold.
fn binarize(patch: &[f32], width: usize, height: usize) -> Vec<f32> {
    let max = patch.iter().copied().fold(f32::MIN, f32::max);
    let stretched: Vec<f32> = if max > 0.0 {
        patch
            .iter()
            .map(|&v| (v * 255.0 / max).round().clamp(0.0, 255.0))
            .collect()
    } else {
        vec![0.0; patch.len()]
    };

    let mean = gaussian_blur(&stretched, width, height);
    stretched
        .iter()
        .zip(&mean)
        .map(|(&v, &m)| if v > m - THRESHOLD_OFFSET { 255.0 } else { 0.0 })
        .collect()
}

/// Separable Gaussian blur with replicated borders.
fn gaussian_blur(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    let radius = (THRESHOLD_BLOCK / 2) as isize;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * THRESHOLD_SIGMA * THRESHOLD_SIGMA)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);

    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

    let mut horizontal = vec![0.0f32; data.len()];
    for y in 0..height {
        for x in 0..width {
            horizontal[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * data[y * width + clamp(x as isize + k as isize - radius, width)])
                .sum();
        }
    }

    let mut out = vec![0.0f32; data.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    w * horizontal[clamp(y as isize + k as isize - radius, height) * width + x]
                })
                .sum();
        }
    }
    out
}
