//! Multi-light fusion
//!
//! Per-light XYZ images are combined into one master image as a weighted sum
//! of corresponding samples. A resizing variant resamples every source with
//! area averaging first, for reduced-resolution previews.

use tracing::{debug, instrument};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::XyzImage;

/// `1/n` for each of `n` lights.
pub fn uniform_weights(count: usize) -> Vec<f32> {
    if count == 0 {
        return Vec::new();
    }
    vec![1.0 / count as f32; count]
}

/// Normalizes integer levels (e.g. slider positions) to weights summing to 1.
/// All-zero levels fall back to uniform weights.
pub fn weights_from_levels(levels: &[u32]) -> Vec<f32> {
    let total: u64 = levels.iter().map(|&l| l as u64).sum();
    if total == 0 {
        return uniform_weights(levels.len());
    }
    levels.iter().map(|&l| l as f32 / total as f32).collect()
}

/// `master[c][p] = Σ weight[light] * xyz[light][c][p]`.
///
/// `None` weights means uniform. Every image must share the dimensions and
/// plane count of the first.
#[instrument(skip_all, fields(lights = images.len()))]
pub fn fuse(images: &[XyzImage], weights: Option<&[f32]>) -> Result<XyzImage> {
    let first = images
        .first()
        .ok_or_else(|| ColorError::InvalidWeights("no images to fuse".to_string()))?;
    for image in &images[1..] {
        first.check_same_shape(image)?;
        if image.plane_count() != first.plane_count() {
            return Err(ColorError::OutOfRange {
                index: first.plane_count().saturating_sub(1),
                count: image.plane_count(),
            });
        }
    }
    let weights = resolve_weights(images.len(), weights)?;

    let (width, height) = first.dimensions();
    let mut master = XyzImage::new(first.plane_count(), width, height)?;
    for (image, &weight) in images.iter().zip(&weights) {
        if weight == 0.0 {
            continue;
        }
        for (out_plane, plane) in master.planes_mut().iter_mut().zip(image.planes()) {
            for (out, &v) in out_plane.iter_mut().zip(plane) {
                *out += weight * v;
            }
        }
    }
    debug!(?weights, "Lights fused");
    Ok(master)
}

/// Resamples each image to `dest_width` (height scaled by the same factor)
/// with area averaging, then fuses. Sources may differ in size.
#[instrument(skip_all, fields(lights = images.len(), dest_width))]
pub fn fuse_resized(
    images: &[XyzImage],
    weights: Option<&[f32]>,
    dest_width: usize,
) -> Result<XyzImage> {
    let resized = images
        .iter()
        .map(|image| resize_area(image, dest_width))
        .collect::<Result<Vec<_>>>()?;
    fuse(&resized, weights)
}

/// Area-averaging resample to `dest_width`, keeping the aspect ratio.
pub fn resize_area(image: &XyzImage, dest_width: usize) -> Result<XyzImage> {
    let (width, height) = image.dimensions();
    if dest_width == 0 {
        return Err(ColorError::InvalidDimensions(dest_width, height));
    }
    let scale = dest_width as f64 / width as f64;
    let dest_height = ((height as f64 * scale).round() as usize).max(1);
    if (dest_width, dest_height) == (width, height) {
        return Ok(image.clone());
    }

    let columns = footprints(width, dest_width);
    let rows = footprints(height, dest_height);

    let planes = image
        .planes()
        .iter()
        .map(|plane| {
            let mut out = vec![0.0f32; dest_width * dest_height];
            for (dy, row_span) in rows.iter().enumerate() {
                for (dx, col_span) in columns.iter().enumerate() {
                    let mut sum = 0.0f64;
                    let mut area = 0.0f64;
                    for &(sy, wy) in row_span {
                        for &(sx, wx) in col_span {
                            let w = wy * wx;
                            sum += plane[sy * width + sx] as f64 * w;
                            area += w;
                        }
                    }
                    out[dy * dest_width + dx] = if area > 0.0 { (sum / area) as f32 } else { 0.0 };
                }
            }
            out
        })
        .collect();
    XyzImage::from_planes(dest_width, dest_height, planes)
}

/// For each destination index, the source indices it covers and the
/// overlap length of each.
fn footprints(src_len: usize, dest_len: usize) -> Vec<Vec<(usize, f64)>> {
    let step = src_len as f64 / dest_len as f64;
    (0..dest_len)
        .map(|d| {
            let start = d as f64 * step;
            let end = start + step;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 0.0).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}

fn resolve_weights(count: usize, weights: Option<&[f32]>) -> Result<Vec<f32>> {
    match weights {
        None => Ok(uniform_weights(count)),
        Some(w) if w.len() != count => Err(ColorError::InvalidWeights(format!(
            "{} weights for {} lights",
            w.len(),
            count
        ))),
        Some(w) if w.iter().any(|v| !v.is_finite()) => Err(ColorError::InvalidWeights(
            "weights must be finite".to_string(),
        )),
        Some(w) => Ok(w.to_vec()),
    }
}
