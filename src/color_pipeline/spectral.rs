//! Spectral integration into CIE XYZ
//!
//! Calibrated band planes are weighted by `cmf(w)[c] * illum(w)` and summed
//! per channel. Dividing by the per-channel sum of those weights normalizes
//! the result so a perfect flat white reflector integrates to 1.

use tracing::{debug, instrument};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::filter::{FilterConfiguration, SpectralWeights};
use crate::color_pipeline::image::{CalibratedImage, XyzImage};

/// Running XYZ sum for one light source.
#[derive(Debug, Clone)]
pub struct XyzAccumulator {
    image: XyzImage,
    scalar: [f32; 3],
    bands: usize,
    finalized: bool,
}

impl XyzAccumulator {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(Self {
            image: XyzImage::new(3, width, height)?,
            scalar: [0.0; 3],
            bands: 0,
            finalized: false,
        })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.image.dimensions()
    }

    /// Adds `plane * cmf[c] * illuminant` into channel `c`.
    pub fn accumulate(&mut self, plane: &[f32], weights: &SpectralWeights) -> Result<()> {
        if self.finalized {
            return Err(ColorError::EngineState(
                "accumulator already finalized".to_string(),
            ));
        }
        if plane.len() != self.image.pixel_count() {
            return Err(ColorError::ShapeMismatch {
                expected: self.image.dimensions(),
                found: (plane.len(), 1),
            });
        }

        let channel_weights = weights.channel_weights();
        for (c, weight) in channel_weights.iter().enumerate() {
            let channel = self.image.plane_mut(c)?;
            for (out, &v) in channel.iter_mut().zip(plane) {
                *out += v * weight;
            }
            self.scalar[c] += weight;
        }
        self.bands += 1;
        debug!(wavelength = weights.wavelength, bands = self.bands, "Band integrated");
        Ok(())
    }

    /// Looks up the weights for `wavelength` and accumulates `plane`.
    pub fn accumulate_band(
        &mut self,
        plane: &[f32],
        wavelength: u32,
        config: &FilterConfiguration,
    ) -> Result<()> {
        let weights = config.weights(wavelength)?;
        self.accumulate(plane, &weights)
    }

    /// Per-channel weight sums accumulated so far.
    pub fn scalar_constants(&self) -> [f32; 3] {
        self.scalar
    }

    pub fn band_count(&self) -> usize {
        self.bands
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Divides every channel by its accumulated weight sum, exactly once.
    pub fn finalize(&mut self) -> Result<()> {
        let constants = self.scalar;
        self.finalize_with(constants)
    }

    /// Divides every channel by the supplied constants, exactly once.
    /// A zero constant leaves its channel at 0.
    pub fn finalize_with(&mut self, constants: [f32; 3]) -> Result<()> {
        if self.finalized {
            return Err(ColorError::EngineState(
                "accumulator already finalized".to_string(),
            ));
        }
        for (c, &constant) in constants.iter().enumerate() {
            let channel = self.image.plane_mut(c)?;
            if constant == 0.0 {
                channel.fill(0.0);
            } else {
                channel.iter_mut().for_each(|v| *v /= constant);
            }
        }
        self.finalized = true;
        Ok(())
    }

    /// Current XYZ sum (unnormalized until finalized).
    pub fn image(&self) -> &XyzImage {
        &self.image
    }

    /// Copy of the current image scaled by the weight sums gathered so far,
    /// so a partially integrated accumulator still reads on the white scale.
    pub fn normalized_snapshot(&self) -> XyzImage {
        let mut snapshot = self.image.clone();
        if self.finalized {
            return snapshot;
        }
        for (channel, &constant) in snapshot.planes_mut().iter_mut().zip(&self.scalar) {
            if constant == 0.0 {
                channel.fill(0.0);
            } else {
                channel.iter_mut().for_each(|v| *v /= constant);
            }
        }
        snapshot
    }

    pub fn into_image(self) -> XyzImage {
        self.image
    }

    pub fn reset(&mut self) {
        self.image.fill(0.0);
        self.scalar = [0.0; 3];
        self.bands = 0;
        self.finalized = false;
    }
}

/// Integrates one calibrated plane per configured wavelength into XYZ.
#[instrument(skip_all, fields(bands = calibrated.plane_count()))]
pub fn integrate(calibrated: &CalibratedImage, config: &FilterConfiguration) -> Result<XyzImage> {
    if calibrated.plane_count() != config.filter_count() {
        return Err(ColorError::OutOfRange {
            index: config.filter_count().saturating_sub(1),
            count: calibrated.plane_count(),
        });
    }

    let (width, height) = calibrated.dimensions();
    let mut accumulator = XyzAccumulator::new(width, height)?;
    for (pos, plane) in calibrated.planes().iter().enumerate() {
        accumulator.accumulate(plane, &config.weights_at(pos)?)?;
    }
    accumulator.finalize()?;
    Ok(accumulator.into_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_pipeline::image::{MultiPlaneImage, X_PLANE, Y_PLANE, Z_PLANE};

    fn config() -> FilterConfiguration {
        FilterConfiguration::builder()
            .wavelengths(vec![450, 500, 550, 600, 650])
            .cmf(450, [0.3362, 0.0380, 1.7721])
            .cmf(500, [0.0049, 0.3230, 0.2720])
            .cmf(550, [0.4334, 0.9950, 0.0087])
            .cmf(600, [1.0622, 0.6310, 0.0008])
            .cmf(650, [0.2835, 0.1070, 0.0])
            .illuminant(450, 1.17)
            .illuminant(500, 1.09)
            .illuminant(550, 1.04)
            .illuminant(600, 0.90)
            .illuminant(650, 0.80)
            .build()
    }

    #[test]
    fn test_flat_white_integrates_to_unity() {
        let config = config();
        let white = MultiPlaneImage::from_planes(3, 2, vec![vec![1.0f32; 6]; 5]).unwrap();
        let xyz = integrate(&white, &config).unwrap();
        for c in [X_PLANE, Y_PLANE, Z_PLANE] {
            assert!(xyz.plane(c).unwrap().iter().all(|v| (v - 1.0).abs() < 1e-5));
        }
    }

    #[test]
    fn test_integration_is_linear_in_reflectance() {
        let config = config();
        let grey = MultiPlaneImage::from_planes(1, 1, vec![vec![0.25f32]; 5]).unwrap();
        let xyz = integrate(&grey, &config).unwrap();
        assert!((xyz.plane(Y_PLANE).unwrap()[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_missing_wavelength_fails() {
        let config = FilterConfiguration::builder()
            .wavelengths(vec![450, 475])
            .cmf(450, [1.0, 1.0, 1.0])
            .illuminant(450, 1.0)
            .build();
        let image = MultiPlaneImage::<f32>::new(2, 2, 2).unwrap();
        assert!(matches!(
            integrate(&image, &config),
            Err(ColorError::MissingSpectralData { wavelength: 475 })
        ));
    }

    #[test]
    fn test_plane_count_must_match_filters() {
        let image = MultiPlaneImage::<f32>::new(3, 2, 2).unwrap();
        assert!(matches!(
            integrate(&image, &config()),
            Err(ColorError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_accumulator_finalizes_once() {
        let config = config();
        let mut acc = XyzAccumulator::new(2, 1).unwrap();
        for &w in config.wavelengths() {
            acc.accumulate_band(&[1.0, 0.5], w, &config).unwrap();
        }
        assert_eq!(acc.band_count(), 5);
        let constants = acc.scalar_constants();
        let expected = config.white_point_constants().unwrap();
        for c in 0..3 {
            assert!((constants[c] - expected[c]).abs() < 1e-5);
        }

        acc.finalize().unwrap();
        assert!(acc.finalize().is_err());
        assert!(acc.accumulate(&[1.0, 1.0], &config.weights(450).unwrap()).is_err());
        let y = acc.image().plane(Y_PLANE).unwrap();
        assert!((y[0] - 1.0).abs() < 1e-5 && (y[1] - 0.5).abs() < 1e-5);

        acc.reset();
        assert!(!acc.is_finalized());
        assert_eq!(acc.image().plane(X_PLANE).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_accumulate_rejects_wrong_plane_length() {
        let mut acc = XyzAccumulator::new(2, 2).unwrap();
        let weights = config().weights(550).unwrap();
        assert!(matches!(
            acc.accumulate(&[1.0; 3], &weights),
            Err(ColorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_reads_partial_sum_on_white_scale() {
        let config = config();
        let mut acc = XyzAccumulator::new(1, 1).unwrap();
        acc.accumulate_band(&[0.5], 550, &config).unwrap();
        let snapshot = acc.normalized_snapshot();
        assert!((snapshot.plane(Y_PLANE).unwrap()[0] - 0.5).abs() < 1e-6);
        assert!(!acc.is_finalized());
    }
}
