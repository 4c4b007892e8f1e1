//! Translational offset estimation in the frequency domain

use rustfft::{num_complex::Complex, FftPlanner};

use crate::color_pipeline::common::error::{ColorError, Result};

/// Keeps the normalized cross-power spectrum finite where both spectra vanish.
const SPECTRUM_EPSILON: f32 = 1e-9;

/// Displacement of the second patch relative to the first, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseOffset {
    pub dx: f32,
    pub dy: f32,
    /// Height of the correlation peak (1.0 for a perfect circular shift).
    pub response: f32,
}

/// Estimates `d` such that `moved(x) ≈ reference(x - d)`.
///
/// Both patches are `width`x`height`, row-major. The integer peak of the
/// inverse normalized cross-power spectrum is refined with a 3x3 weighted
/// centroid.
pub fn phase_correlate(
    reference: &[f32],
    moved: &[f32],
    width: usize,
    height: usize,
) -> Result<PhaseOffset> {
    if width == 0 || height == 0 {
        return Err(ColorError::InvalidDimensions(width, height));
    }
    let expected = width * height;
    if reference.len() != expected || moved.len() != expected {
        return Err(ColorError::ShapeMismatch {
            expected: (width, height),
            found: (reference.len().min(moved.len()), 1),
        });
    }

    let mut planner = FftPlanner::<f32>::new();
    let mut fa = to_complex(reference);
    let mut fb = to_complex(moved);
    fft2d(&mut planner, &mut fa, width, height, false);
    fft2d(&mut planner, &mut fb, width, height, false);

    // R = Fb * conj(Fa) / |Fb * conj(Fa)|
    let mut cross: Vec<Complex<f32>> = fb
        .iter()
        .zip(&fa)
        .map(|(b, a)| {
            let product = b * a.conj();
            product / (product.norm() + SPECTRUM_EPSILON)
        })
        .collect();
    fft2d(&mut planner, &mut cross, width, height, true);

    let scale = 1.0 / expected as f32;
    let surface: Vec<f32> = cross.iter().map(|c| c.re * scale).collect();

    let (peak_index, &peak) = surface
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(ColorError::InvalidDimensions(width, height))?;
    let px = peak_index % width;
    let py = peak_index / width;

    let (fx, fy) = refine_peak(&surface, width, height, px, py);
    Ok(PhaseOffset {
        dx: wrap(px as f32 + fx, width),
        dy: wrap(py as f32 + fy, height),
        response: peak,
    })
}

fn to_complex(data: &[f32]) -> Vec<Complex<f32>> {
    data.iter().map(|&v| Complex::new(v, 0.0)).collect()
}

/// In-place 2D FFT: rows, then columns through a transposed buffer.
fn fft2d(
    planner: &mut FftPlanner<f32>,
    data: &mut [Complex<f32>],
    width: usize,
    height: usize,
    inverse: bool,
) {
    let row_fft = if inverse {
        planner.plan_fft_inverse(width)
    } else {
        planner.plan_fft_forward(width)
    };
    row_fft.process(data);

    let mut columns = vec![Complex::new(0.0, 0.0); data.len()];
    for y in 0..height {
        for x in 0..width {
            columns[x * height + y] = data[y * width + x];
        }
    }
    let col_fft = if inverse {
        planner.plan_fft_inverse(height)
    } else {
        planner.plan_fft_forward(height)
    };
    col_fft.process(&mut columns);
    for x in 0..width {
        for y in 0..height {
            data[y * width + x] = columns[x * height + y];
        }
    }
}

/// Sub-pixel correction from the weighted centroid of the 3x3 neighborhood
/// (wrapping at the borders, negative weights ignored).
fn refine_peak(surface: &[f32], width: usize, height: usize, px: usize, py: usize) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut sx = 0.0f32;
    let mut sy = 0.0f32;
    for dy in -1isize..=1 {
        for dx in -1isize..=1 {
            let x = (px as isize + dx).rem_euclid(width as isize) as usize;
            let y = (py as isize + dy).rem_euclid(height as isize) as usize;
            let w = surface[y * width + x].max(0.0);
            sum += w;
            sx += w * dx as f32;
            sy += w * dy as f32;
        }
    }
    if sum > 0.0 {
        (sx / sum, sy / sum)
    } else {
        (0.0, 0.0)
    }
}

/// Maps a circular peak position into `(-len/2, len/2]`.
fn wrap(position: f32, len: usize) -> f32 {
    let len = len as f32;
    if position > len / 2.0 {
        position - len
    } else {
        position
    }
}
