//! Uniform-scale + translation warp with bilinear resampling

/// Forward map `p' = scale * p + (tx, ty)`; no rotation term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub scale: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Scale about the image center: the center pixel is the fixed point.
    pub fn about_center(scale: f32, width: usize, height: usize) -> Self {
        let cx = (width / 2) as f32;
        let cy = (height / 2) as f32;
        Self {
            scale,
            tx: cx * (1.0 - scale),
            ty: cy * (1.0 - scale),
        }
    }

    pub fn translated(self, dx: f32, dy: f32) -> Self {
        Self {
            tx: self.tx + dx,
            ty: self.ty + dy,
            ..self
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.scale * x + self.tx, self.scale * y + self.ty)
    }

    pub fn apply_inverse(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.tx) / self.scale, (y - self.ty) / self.scale)
    }
}

/// Resamples `plane` through `transform`: `out(p) = plane(transform⁻¹(p))`.
/// Samples falling outside the source read as 0.
pub fn warp_plane(plane: &[f32], width: usize, height: usize, transform: &SimilarityTransform) -> Vec<f32> {
    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = transform.apply_inverse(x as f32, y as f32);
            out[y * width + x] = bilinear(plane, width, height, sx, sy);
        }
    }
    out
}

fn bilinear(plane: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as isize;
    let y0 = y0 as isize;

    let sample = |xi: isize, yi: isize| -> f32 {
        if xi < 0 || yi < 0 || xi >= width as isize || yi >= height as isize {
            0.0
        } else {
            plane[yi as usize * width + xi as usize]
        }
    };

    let top = sample(x0, y0) * (1.0 - fx) + sample(x0 + 1, y0) * fx;
    let bottom = sample(x0, y0 + 1) * (1.0 - fx) + sample(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}
