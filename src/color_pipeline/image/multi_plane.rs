use std::fmt::Debug;

use tracing::warn;

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::common::{GuardStats, Rect};

/// Scalar sample stored in a [`MultiPlaneImage`].
pub trait Sample: Copy + Default + PartialOrd + Debug + Send + Sync + 'static {
    fn to_f32(self) -> f32;

    /// `self - rhs`, clamped at zero instead of wrapping.
    fn sub_clamped(self, rhs: u16) -> Self;
}

impl Sample for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn sub_clamped(self, rhs: u16) -> Self {
        (self - rhs as f32).max(0.0)
    }
}

impl Sample for u16 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn sub_clamped(self, rhs: u16) -> Self {
        self.saturating_sub(rhs)
    }
}

impl Sample for u8 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn sub_clamped(self, rhs: u16) -> Self {
        // result never exceeds self, so it always fits back into u8
        (self as u16).saturating_sub(rhs) as u8
    }
}

/// N independently allocated planes of `width * height` samples.
///
/// All planes share the same dimensions and the plane count is fixed at
/// construction. `Clone` duplicates every plane.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPlaneImage<T> {
    width: usize,
    height: usize,
    planes: Vec<Vec<T>>,
}

impl<T: Sample> MultiPlaneImage<T> {
    /// Allocates `plane_count` zero-filled planes.
    pub fn new(plane_count: usize, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        Ok(Self {
            width,
            height,
            planes: vec![vec![T::default(); width * height]; plane_count],
        })
    }

    /// Takes ownership of existing plane buffers, checking every length.
    pub fn from_planes(width: usize, height: usize, planes: Vec<Vec<T>>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        if let Some(bad) = planes.iter().find(|p| p.len() != width * height) {
            return Err(ColorError::ShapeMismatch {
                expected: (width, height),
                found: (bad.len(), 1),
            });
        }
        Ok(Self::from_planes_unchecked(width, height, planes))
    }

    pub(crate) fn from_planes_unchecked(width: usize, height: usize, planes: Vec<Vec<T>>) -> Self {
        Self {
            width,
            height,
            planes,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Result<&[T]> {
        let count = self.planes.len();
        self.planes
            .get(index)
            .map(Vec::as_slice)
            .ok_or(ColorError::OutOfRange { index, count })
    }

    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [T]> {
        let count = self.planes.len();
        self.planes
            .get_mut(index)
            .map(Vec::as_mut_slice)
            .ok_or(ColorError::OutOfRange { index, count })
    }

    pub fn planes(&self) -> &[Vec<T>] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.planes
    }

    pub fn into_planes(self) -> Vec<Vec<T>> {
        self.planes
    }

    /// Sample at `(x, y)` in plane `index`.
    pub fn get(&self, index: usize, x: usize, y: usize) -> Result<T> {
        let plane = self.plane(index)?;
        if x >= self.width || y >= self.height {
            return Err(ColorError::RectOutOfBounds {
                rect: (x, y, 1, 1),
                width: self.width,
                height: self.height,
            });
        }
        Ok(plane[y * self.width + x])
    }

    pub fn fill(&mut self, value: T) {
        for plane in &mut self.planes {
            plane.fill(value);
        }
    }

    /// Fails with `ShapeMismatch` unless `other` has the same width and height.
    pub fn check_same_shape<U: Sample>(&self, other: &MultiPlaneImage<U>) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(ColorError::ShapeMismatch {
                expected: self.dimensions(),
                found: other.dimensions(),
            });
        }
        Ok(())
    }

    /// Builds a new image of the same shape by mapping every sample.
    pub fn map<U: Sample>(&self, f: impl Fn(T) -> U) -> MultiPlaneImage<U> {
        MultiPlaneImage {
            width: self.width,
            height: self.height,
            planes: self
                .planes
                .iter()
                .map(|plane| plane.iter().map(|&v| f(v)).collect())
                .collect(),
        }
    }

    /// Deep copy of the pixels inside `rect`, for every plane.
    pub fn crop(&self, rect: Rect) -> Result<Self> {
        rect.check_within(self.width, self.height)?;
        let planes = self
            .planes
            .iter()
            .map(|plane| rect.indices(self.width).map(|i| plane[i]).collect())
            .collect();
        Ok(Self {
            width: rect.width,
            height: rect.height,
            planes,
        })
    }

    /// Subtracts a row-major sequence of samples from every plane, clamping at zero.
    pub fn subtract_samples(&mut self, samples: &[u16]) -> Result<()> {
        if samples.len() != self.pixel_count() {
            return Err(ColorError::ShapeMismatch {
                expected: self.dimensions(),
                found: (samples.len(), 1),
            });
        }
        for plane in &mut self.planes {
            for (value, &sub) in plane.iter_mut().zip(samples) {
                *value = value.sub_clamped(sub);
            }
        }
        Ok(())
    }
}

impl MultiPlaneImage<f32> {
    /// Divides each plane by the corresponding plane of `divisor`.
    ///
    /// Zero divisors produce 0 and are counted in the returned stats.
    pub fn divide_by<D: Sample>(&mut self, divisor: &MultiPlaneImage<D>) -> Result<GuardStats> {
        self.check_same_shape(divisor)?;
        if divisor.plane_count() != self.plane_count() {
            return Err(ColorError::OutOfRange {
                index: self.plane_count().saturating_sub(1),
                count: divisor.plane_count(),
            });
        }

        let mut stats = GuardStats::default();
        for (plane, div_plane) in self.planes.iter_mut().zip(divisor.planes()) {
            stats.flat_field_zeros += divide_guarded(plane, div_plane);
        }
        if stats.flat_field_zeros > 0 {
            warn!(
                zeros = stats.flat_field_zeros,
                "Zero divisor samples replaced with 0"
            );
        }
        Ok(stats)
    }

    /// Divides every plane by a row-major sequence of samples.
    ///
    /// Zero divisors produce 0; the returned count covers all planes.
    pub fn divide_samples<D: Sample>(&mut self, divisor: &[D]) -> Result<usize> {
        if divisor.len() != self.pixel_count() {
            return Err(ColorError::ShapeMismatch {
                expected: self.dimensions(),
                found: (divisor.len(), 1),
            });
        }
        Ok(self
            .planes
            .iter_mut()
            .map(|plane| divide_guarded(plane, divisor))
            .sum())
    }

    /// Multiplies every sample of every plane by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for plane in &mut self.planes {
            plane.iter_mut().for_each(|v| *v *= factor);
        }
    }
}

/// `values[i] /= divisor[i]`, writing 0 where the divisor is 0. Returns the zero count.
fn divide_guarded<D: Sample>(values: &mut [f32], divisor: &[D]) -> usize {
    let mut zeros = 0;
    for (value, &div) in values.iter_mut().zip(divisor) {
        let div = div.to_f32();
        if div == 0.0 {
            *value = 0.0;
            zeros += 1;
        } else {
            *value /= div;
        }
    }
    zeros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_image_is_zeroed() {
        for (w, h) in [(1, 1), (3, 5), (16, 9)] {
            let image = MultiPlaneImage::<f32>::new(4, w, h).unwrap();
            assert_eq!(image.plane_count(), 4);
            assert!(image.planes().iter().all(|p| p.len() == w * h));
            assert!(image.planes().iter().flatten().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_plane_out_of_range() {
        let mut image = MultiPlaneImage::<u16>::new(3, 2, 2).unwrap();
        assert!(matches!(
            image.plane(3),
            Err(ColorError::OutOfRange { index: 3, count: 3 })
        ));
        assert!(image.plane_mut(7).is_err());
        assert!(image.plane(2).is_ok());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            MultiPlaneImage::<f32>::new(1, 0, 4),
            Err(ColorError::InvalidDimensions(0, 4))
        ));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = MultiPlaneImage::<f32>::new(2, 2, 2).unwrap();
        a.plane_mut(1).unwrap()[3] = 5.0;
        let mut b = a.clone();
        b.plane_mut(1).unwrap()[3] = 9.0;
        assert_eq!(a.plane(1).unwrap()[3], 5.0);
        assert_eq!(b.plane(1).unwrap()[3], 9.0);
    }

    #[test]
    fn test_subtract_clamps_at_zero() {
        let mut image =
            MultiPlaneImage::from_planes(3, 1, vec![vec![10u16, 5, 0], vec![1, 2, 3]]).unwrap();
        image.subtract_samples(&[4, 6, 1]).unwrap();
        assert_eq!(image.plane(0).unwrap(), &[6, 0, 0]);
        assert_eq!(image.plane(1).unwrap(), &[0, 0, 2]);

        let mut floats = MultiPlaneImage::from_planes(2, 1, vec![vec![1.5f32, 8.0]]).unwrap();
        floats.subtract_samples(&[2u16, 3]).unwrap();
        assert_eq!(floats.plane(0).unwrap(), &[0.0, 5.0]);
    }

    #[test]
    fn test_subtract_rejects_wrong_length() {
        let mut image = MultiPlaneImage::<u16>::new(1, 2, 2).unwrap();
        assert!(matches!(
            image.subtract_samples(&[1, 2, 3]),
            Err(ColorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_divide_by_guards_zero() {
        let mut image =
            MultiPlaneImage::from_planes(2, 2, vec![vec![4.0f32, 9.0, 1.0, 6.0]]).unwrap();
        let flat = MultiPlaneImage::from_planes(2, 2, vec![vec![2u16, 0, 4, 3]]).unwrap();
        let stats = image.divide_by(&flat).unwrap();

        let plane = image.plane(0).unwrap();
        assert_eq!(plane, &[2.0, 0.0, 0.25, 2.0]);
        assert!(plane.iter().all(|v| v.is_finite()));
        assert_eq!(stats.flat_field_zeros, 1);
    }

    #[test]
    fn test_divide_by_rejects_shape_mismatch() {
        let mut image = MultiPlaneImage::<f32>::new(1, 2, 2).unwrap();
        let flat = MultiPlaneImage::<u16>::new(1, 3, 2).unwrap();
        assert!(matches!(
            image.divide_by(&flat),
            Err(ColorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_divide_samples_applies_to_every_plane() {
        let mut image = MultiPlaneImage::from_planes(
            3,
            1,
            vec![vec![4.0f32, 9.0, 1.0], vec![8.0, 3.0, 2.0]],
        )
        .unwrap();
        let zeros = image.divide_samples(&[2u16, 0, 4]).unwrap();
        assert_eq!(zeros, 2);
        assert_eq!(image.plane(0).unwrap(), &[2.0, 0.0, 0.25]);
        assert_eq!(image.plane(1).unwrap(), &[4.0, 0.0, 0.5]);

        assert!(matches!(
            image.divide_samples(&[1u16, 2]),
            Err(ColorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_crop_copies_region() {
        let image = MultiPlaneImage::from_planes(
            3,
            3,
            vec![(0..9).map(|v| v as f32).collect::<Vec<_>>()],
        )
        .unwrap();
        let cropped = image.crop(Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(cropped.dimensions(), (2, 2));
        assert_eq!(cropped.plane(0).unwrap(), &[4.0, 5.0, 7.0, 8.0]);
        assert!(image.crop(Rect::new(2, 2, 2, 2)).is_err());
    }
}
