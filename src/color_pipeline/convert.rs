//! XYZ to perceptual and display color spaces
//!
//! Pointwise conversions over an [`XyzImage`], each with a cropped variant
//! that converts only the pixels inside a rectangle.

use tracing::instrument;

use crate::color_pipeline::common::error::Result;
use crate::color_pipeline::common::Rect;
use crate::color_pipeline::image::{LabImage, MultiPlaneImage, RgbImage, XyzImage, X_PLANE, Y_PLANE, Z_PLANE};

const LAB_EPSILON: f32 = 216.0 / 24389.0;
const LAB_KAPPA: f32 = 24389.0 / 27.0;

/// Chromatic adaptation scalars applied to X and Z before the RGB matrix.
const ADAPT_X: f32 = 0.96422;
const ADAPT_Z: f32 = 0.82521;

/// XYZ (D50) to linear RGB, Bradford-adapted.
const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.1338561, -1.6168667, -0.4906146],
    [-0.9787684, 1.9161415, 0.0334540],
    [0.0719453, -0.2289914, 1.4052427],
];

const DISPLAY_GAMMA: f32 = 1.8;

/// White the pipeline normalizes to: a perfect reflector integrates to 1 in
/// every channel.
pub const UNIT_WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Approximate D65 white in XYZ.
pub const D65_WHITE: [f32; 3] = [0.9505, 1.0, 1.089];

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        (t * LAB_KAPPA + 16.0) / 116.0
    }
}

/// One XYZ sample to `(L*, a*, b*)` relative to `white`.
pub fn lab_pixel(xyz: [f32; 3], white: [f32; 3]) -> [f32; 3] {
    let fx = lab_f(xyz[0] / white[0]);
    let fy = lab_f(xyz[1] / white[1]);
    let fz = lab_f(xyz[2] / white[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// One XYZ sample to 8-bit display RGB.
pub fn srgb_pixel(xyz: [f32; 3]) -> [u8; 3] {
    let adapted = [xyz[0] * ADAPT_X, xyz[1], xyz[2] * ADAPT_Z];
    let mut out = [0u8; 3];
    for (channel, row) in out.iter_mut().zip(XYZ_TO_RGB.iter()) {
        let linear = row[0] * adapted[0] + row[1] * adapted[1] + row[2] * adapted[2];
        // negative linear values have no real power; they display as black
        let encoded = linear.max(0.0).powf(1.0 / DISPLAY_GAMMA) * 255.0;
        *channel = (encoded.min(255.0) + 0.5).floor() as u8;
    }
    out
}

/// Lab relative to [`UNIT_WHITE`].
pub fn xyz_to_lab(xyz: &XyzImage) -> Result<LabImage> {
    xyz_to_lab_with_white(xyz, UNIT_WHITE)
}

#[instrument(skip(xyz))]
pub fn xyz_to_lab_with_white(xyz: &XyzImage, white: [f32; 3]) -> Result<LabImage> {
    let (x, y, z) = channels(xyz)?;
    let mut planes = vec![Vec::with_capacity(x.len()); 3];
    for i in 0..x.len() {
        let lab = lab_pixel([x[i], y[i], z[i]], white);
        for (plane, v) in planes.iter_mut().zip(lab) {
            plane.push(v);
        }
    }
    LabImage::from_planes(xyz.width(), xyz.height(), planes)
}

pub fn xyz_to_lab_cropped(xyz: &XyzImage, rect: Rect) -> Result<LabImage> {
    xyz_to_lab(&xyz.crop(rect)?)
}

#[instrument(skip(xyz))]
pub fn xyz_to_srgb(xyz: &XyzImage) -> Result<RgbImage> {
    let (x, y, z) = channels(xyz)?;
    let mut planes = vec![Vec::with_capacity(x.len()); 3];
    for i in 0..x.len() {
        let rgb = srgb_pixel([x[i], y[i], z[i]]);
        for (plane, v) in planes.iter_mut().zip(rgb) {
            plane.push(v);
        }
    }
    RgbImage::from_planes(xyz.width(), xyz.height(), planes)
}

pub fn xyz_to_srgb_cropped(xyz: &XyzImage, rect: Rect) -> Result<RgbImage> {
    xyz_to_srgb(&xyz.crop(rect)?)
}

fn channels(xyz: &XyzImage) -> Result<(&[f32], &[f32], &[f32])> {
    Ok((xyz.plane(X_PLANE)?, xyz.plane(Y_PLANE)?, xyz.plane(Z_PLANE)?))
}

impl MultiPlaneImage<u8> {
    /// Packed `RGBRGB...` rows from the first three planes.
    pub fn to_interleaved(&self) -> Result<Vec<u8>> {
        let (r, g, b) = (self.plane(0)?, self.plane(1)?, self.plane(2)?);
        let mut packed = Vec::with_capacity(r.len() * 3);
        for i in 0..r.len() {
            packed.extend_from_slice(&[r[i], g[i], b[i]]);
        }
        Ok(packed)
    }
}
