//! Radiometric calibration
//!
//! Bias subtraction (clamped at zero) followed by flat-field division
//! (zero-guarded), producing normalized sensor response as `f32`.

use tracing::{debug, warn};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::common::GuardStats;
use crate::color_pipeline::image::{CalibratedImage, FlatFieldImage, MultiPlaneImage, RawFrame};

/// Calibrates every plane of `raw`: `max(raw - bias, 0) / flat`, with 0
/// wherever the flat-field sample is 0.
pub fn calibrate(
    raw: &MultiPlaneImage<u16>,
    bias: &RawFrame,
    flat: &FlatFieldImage,
) -> Result<(CalibratedImage, GuardStats)> {
    raw.check_same_shape(flat)?;
    bias.check_shape(raw.width(), raw.height())?;

    let mut calibrated = raw.map(|v| v as f32);
    calibrated.subtract_samples(&bias.data)?;
    let stats = calibrated.divide_by(flat)?;
    Ok((calibrated, stats))
}

/// Bias frame plus one flat-field image per light source.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    width: usize,
    height: usize,
    bias: Option<RawFrame>,
    flat_fields: Vec<FlatFieldImage>,
}

impl CalibrationSet {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bias: None,
            flat_fields: Vec::new(),
        }
    }

    pub fn set_bias(&mut self, bias: RawFrame) -> Result<()> {
        bias.check_shape(self.width, self.height)?;
        self.bias = Some(bias);
        Ok(())
    }

    /// Appends the flat field for the next light source, one plane per wavelength.
    pub fn add_flat_field(&mut self, flat: FlatFieldImage) -> Result<()> {
        if flat.dimensions() != (self.width, self.height) {
            return Err(ColorError::ShapeMismatch {
                expected: (self.width, self.height),
                found: flat.dimensions(),
            });
        }
        self.flat_fields.push(flat);
        Ok(())
    }

    pub fn bias(&self) -> Option<&RawFrame> {
        self.bias.as_ref()
    }

    pub fn flat_field_count(&self) -> usize {
        self.flat_fields.len()
    }

    /// Fails unless every light has a flat field with a plane per band.
    pub fn check_complete(&self, lights: usize, bands: usize) -> Result<()> {
        if self.flat_fields.len() != lights {
            return Err(ColorError::EngineState(format!(
                "expected {} flat fields, have {}",
                lights,
                self.flat_fields.len()
            )));
        }
        if let Some(flat) = self.flat_fields.iter().find(|f| f.plane_count() != bands) {
            return Err(ColorError::OutOfRange {
                index: bands.saturating_sub(1),
                count: flat.plane_count(),
            });
        }
        Ok(())
    }

    /// Calibrates one frame captured under `light` through filter slot `band`.
    /// A missing bias frame is treated as all zeros.
    pub fn calibrate_frame(
        &self,
        frame: &RawFrame,
        light: usize,
        band: usize,
    ) -> Result<(CalibratedImage, GuardStats)> {
        frame.check_shape(self.width, self.height)?;
        let flat = self
            .flat_fields
            .get(light)
            .ok_or(ColorError::OutOfRange {
                index: light,
                count: self.flat_fields.len(),
            })?
            .plane(band)?;

        let mut image = frame.to_f32_image();
        if let Some(bias) = &self.bias {
            image.subtract_samples(&bias.data)?;
        }
        let zeros = image.divide_samples(flat)?;
        if zeros > 0 {
            warn!(light, band, zeros, "Flat-field zeros replaced with 0");
        }
        debug!(light, band, "Frame calibrated");

        Ok((
            image,
            GuardStats {
                flat_field_zeros: zeros,
                white_point_zeros: 0,
            },
        ))
    }
}
