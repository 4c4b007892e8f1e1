use std::path::Path;

use tracing::{debug, info};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::filter::presets::FilterLayout;
use crate::color_pipeline::filter::tables::{CmfTable, IlluminantTable};

/// Spectral weights for one configured wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralWeights {
    pub wavelength: u32,
    pub cmf: [f32; 3],
    pub illuminant: f32,
}

impl SpectralWeights {
    /// `cmf[c] * illuminant` for each XYZ channel.
    pub fn channel_weights(&self) -> [f32; 3] {
        [
            self.cmf[0] * self.illuminant,
            self.cmf[1] * self.illuminant,
            self.cmf[2] * self.illuminant,
        ]
    }
}

/// Immutable wavelength table plus filter-wheel layout.
///
/// Shared read-only (usually behind an `Arc`) by every stage that needs
/// spectral weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfiguration {
    layout: FilterLayout,
    cmf: CmfTable,
    illuminant: IlluminantTable,
}

impl FilterConfiguration {
    pub fn builder() -> FilterConfigurationBuilder {
        FilterConfigurationBuilder::default()
    }

    /// Builds the configuration, interpolating illuminant values onto every
    /// CMF wavelength that lacks a measurement.
    pub fn from_tables(layout: FilterLayout, cmf: CmfTable, illuminant: IlluminantTable) -> Self {
        let illuminant = illuminant.resample_to(cmf.wavelengths());
        debug!(
            "Filter configuration: {} filters, {} CMF rows, {} illuminant rows",
            layout.wavelengths.len(),
            cmf.len(),
            illuminant.len()
        );
        Self {
            layout,
            cmf,
            illuminant,
        }
    }

    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        layout: FilterLayout,
        cmf_path: P,
        illuminant_path: Q,
    ) -> Result<Self> {
        let cmf_path = cmf_path.as_ref();
        let illuminant_path = illuminant_path.as_ref();
        info!(
            cmf = %cmf_path.display(),
            illuminant = %illuminant_path.display(),
            "Loading spectral tables"
        );
        let cmf = CmfTable::from_file(cmf_path)?;
        let illuminant = IlluminantTable::from_file(illuminant_path)?;
        Ok(Self::from_tables(layout, cmf, illuminant))
    }

    pub fn filter_count(&self) -> usize {
        self.layout.wavelengths.len()
    }

    pub fn wavelengths(&self) -> &[u32] {
        &self.layout.wavelengths
    }

    pub fn wavelength_at(&self, pos: usize) -> Result<u32> {
        slot(&self.layout.wavelengths, pos)
    }

    pub fn hardware_position(&self, pos: usize) -> Result<u32> {
        slot(&self.layout.hardware_positions, pos)
    }

    pub fn focus_position(&self, pos: usize) -> Result<i64> {
        slot(&self.layout.focus_positions, pos)
    }

    pub fn bandpass_width(&self) -> Option<u32> {
        self.layout.bandpass_width
    }

    pub fn cmf(&self, wavelength: u32) -> Result<[f32; 3]> {
        self.cmf
            .get(wavelength)
            .ok_or(ColorError::MissingSpectralData { wavelength })
    }

    pub fn illuminant(&self, wavelength: u32) -> Result<f32> {
        self.illuminant
            .get(wavelength)
            .ok_or(ColorError::MissingSpectralData { wavelength })
    }

    pub fn weights(&self, wavelength: u32) -> Result<SpectralWeights> {
        Ok(SpectralWeights {
            wavelength,
            cmf: self.cmf(wavelength)?,
            illuminant: self.illuminant(wavelength)?,
        })
    }

    /// Weights for the filter in slot `pos`.
    pub fn weights_at(&self, pos: usize) -> Result<SpectralWeights> {
        self.weights(self.wavelength_at(pos)?)
    }

    /// `sum_w cmf(w)[c] * illum(w)` over the configured wavelengths: the value
    /// a perfect white reflector integrates to in each channel.
    pub fn white_point_constants(&self) -> Result<[f32; 3]> {
        let mut constants = [0.0f32; 3];
        for &wavelength in self.wavelengths() {
            let weights = self.weights(wavelength)?.channel_weights();
            for c in 0..3 {
                constants[c] += weights[c];
            }
        }
        Ok(constants)
    }

    /// Fails with `MissingSpectralData` for the first configured wavelength
    /// lacking a CMF or illuminant entry.
    pub fn validate(&self) -> Result<()> {
        for &wavelength in self.wavelengths() {
            self.weights(wavelength)?;
        }
        Ok(())
    }
}

fn slot<T: Copy>(values: &[T], pos: usize) -> Result<T> {
    values.get(pos).copied().ok_or(ColorError::OutOfRange {
        index: pos,
        count: values.len(),
    })
}

/// Builder for FilterConfiguration
#[derive(Default)]
pub struct FilterConfigurationBuilder {
    layout: Option<FilterLayout>,
    cmf: CmfTable,
    illuminant: IlluminantTable,
}

impl FilterConfigurationBuilder {
    pub fn layout(mut self, layout: FilterLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn wavelengths(mut self, wavelengths: Vec<u32>) -> Self {
        self.layout = Some(FilterLayout::from_wavelengths(wavelengths));
        self
    }

    pub fn cmf_table(mut self, cmf: CmfTable) -> Self {
        self.cmf = cmf;
        self
    }

    pub fn illuminant_table(mut self, illuminant: IlluminantTable) -> Self {
        self.illuminant = illuminant;
        self
    }

    pub fn cmf(mut self, wavelength: u32, xyz: [f32; 3]) -> Self {
        self.cmf.insert(wavelength, xyz);
        self
    }

    /// Illuminant value on the ingested scale (already divided by 100).
    pub fn illuminant(mut self, wavelength: u32, value: f32) -> Self {
        self.illuminant.insert(wavelength, value);
        self
    }

    pub fn build(self) -> FilterConfiguration {
        let layout = self
            .layout
            .unwrap_or_else(|| FilterLayout::from_wavelengths(self.cmf.wavelengths().collect()));
        FilterConfiguration::from_tables(layout, self.cmf, self.illuminant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_pipeline::filter::presets::FilterPreset;

    fn sample_config() -> FilterConfiguration {
        FilterConfiguration::builder()
            .wavelengths(vec![450, 550, 650])
            .cmf(450, [0.3362, 0.0380, 1.7721])
            .cmf(550, [0.4334, 0.9950, 0.0087])
            .cmf(650, [0.2835, 0.1070, 0.0])
            .illuminant(450, 1.0)
            .illuminant(650, 0.5)
            .build()
    }

    #[test]
    fn test_missing_illuminant_is_interpolated() {
        let config = sample_config();
        assert!((config.illuminant(550).unwrap() - 0.75).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_outside_table_fails() {
        let config = sample_config();
        assert!(matches!(
            config.cmf(700),
            Err(ColorError::MissingSpectralData { wavelength: 700 })
        ));
        assert!(matches!(
            config.illuminant(400),
            Err(ColorError::MissingSpectralData { wavelength: 400 })
        ));
    }

    #[test]
    fn test_white_point_constants_sum_weights() {
        let config = sample_config();
        let constants = config.white_point_constants().unwrap();
        let expected_y = 0.0380 * 1.0 + 0.9950 * 0.75 + 0.1070 * 0.5;
        assert!((constants[1] - expected_y).abs() < 1e-5);
    }

    #[test]
    fn test_validate_reports_missing_wavelength() {
        let config = FilterConfiguration::builder()
            .wavelengths(vec![450, 500])
            .cmf(450, [1.0, 1.0, 1.0])
            .illuminant(450, 1.0)
            .illuminant(500, 1.0)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ColorError::MissingSpectralData { wavelength: 500 })
        ));
    }

    #[test]
    fn test_slot_accessors() {
        let config = FilterConfiguration::builder()
            .layout(FilterPreset::Apr2014.layout())
            .build();
        assert_eq!(config.filter_count(), 15);
        assert_eq!(config.wavelength_at(0).unwrap(), 570);
        assert_eq!(config.hardware_position(14).unwrap(), 16);
        assert_eq!(config.focus_position(14).unwrap(), 72000);
        assert_eq!(config.bandpass_width(), Some(3));
        assert!(matches!(
            config.wavelength_at(15),
            Err(ColorError::OutOfRange { index: 15, count: 15 })
        ));
    }
}
