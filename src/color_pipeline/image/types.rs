//! Image type aliases and the raw sensor frame

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::MultiPlaneImage;

/// Plane index of CIE X in an [`XyzImage`].
pub const X_PLANE: usize = 0;
/// Plane index of CIE Y in an [`XyzImage`].
pub const Y_PLANE: usize = 1;
/// Plane index of CIE Z in an [`XyzImage`].
pub const Z_PLANE: usize = 2;

/// One plane per spectral band, `raw / flat`.
pub type CalibratedImage = MultiPlaneImage<f32>;
/// One plane per configured wavelength, captured under a single light source.
pub type FlatFieldImage = MultiPlaneImage<u16>;
/// Exactly three planes: X, Y, Z.
pub type XyzImage = MultiPlaneImage<f32>;
/// Exactly three planes: L*, a*, b*.
pub type LabImage = MultiPlaneImage<f32>;
/// Exactly three planes: R, G, B in 0..=255.
pub type RgbImage = MultiPlaneImage<u8>;

/// A single decoded sensor exposure
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Width of the frame in pixels
    pub width: usize,
    /// Height of the frame in pixels
    pub height: usize,
    /// Row-major samples, `y * width + x`
    pub data: Vec<u16>,
}

impl RawFrame {
    pub fn new(width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ColorError::InvalidDimensions(width, height));
        }
        if data.len() != width * height {
            return Err(ColorError::ShapeMismatch {
                expected: (width, height),
                found: (data.len(), 1),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame where every sample has the same value.
    pub fn filled(width: usize, height: usize, value: u16) -> Result<Self> {
        Self::new(width, height, vec![value; width * height])
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn check_shape(&self, width: usize, height: usize) -> Result<()> {
        if self.dimensions() != (width, height) {
            return Err(ColorError::ShapeMismatch {
                expected: (width, height),
                found: self.dimensions(),
            });
        }
        Ok(())
    }

    /// Single-plane `f32` copy of the samples, the starting point of calibration.
    pub fn to_f32_image(&self) -> MultiPlaneImage<f32> {
        let data = self.data.iter().map(|&v| v as f32).collect();
        MultiPlaneImage::from_planes_unchecked(self.width, self.height, vec![data])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_validates_length() {
        assert!(RawFrame::new(2, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            RawFrame::new(2, 2, vec![0; 3]),
            Err(ColorError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            RawFrame::new(0, 2, vec![]),
            Err(ColorError::InvalidDimensions(0, 2))
        ));
    }

    #[test]
    fn test_f32_image_keeps_samples() {
        let frame = RawFrame::new(2, 1, vec![7, 9]).unwrap();
        let image = frame.to_f32_image();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.plane_count(), 1);
        assert_eq!(image.plane(0).unwrap(), &[7.0, 9.0]);
    }
}
