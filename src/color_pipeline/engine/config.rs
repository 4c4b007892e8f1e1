//! Engine configuration types

use std::path::PathBuf;

use crate::color_pipeline::archive::ArchiveCompression;

/// Reference white of the calibration target, per band, when none is given.
pub const DEFAULT_REFERENCE_WHITE: f32 = 0.9666;

/// Configuration for a [`ColorEngine`](crate::color_pipeline::engine::ColorEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frame width in pixels
    pub width: usize,
    /// Frame height in pixels
    pub height: usize,
    /// Number of light sources captured per band
    pub light_count: usize,
    /// Reference white per band; `None` uses [`DEFAULT_REFERENCE_WHITE`] for every band
    pub reference_white: Option<Vec<f32>>,
    /// Whether bands after the first are registered to the first
    pub register: bool,
    /// Whether registration targets are binarized before correlation
    pub binarize_targets: bool,
    /// Where to write the calibrated-plane archive, if anywhere
    pub archive_path: Option<PathBuf>,
    pub archive_compression: ArchiveCompression,
    /// Illuminant name recorded in the archive
    pub illuminant_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            light_count: 1,
            reference_white: None,
            register: true,
            binarize_targets: true,
            archive_path: None,
            archive_compression: ArchiveCompression::None,
            illuminant_name: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Reference white for each of `band_count` bands.
    pub fn reference_whites(&self, band_count: usize) -> Vec<f32> {
        match &self.reference_white {
            Some(values) => values.clone(),
            None => vec![DEFAULT_REFERENCE_WHITE; band_count],
        }
    }
}

/// Builder for EngineConfig
#[derive(Default)]
pub struct EngineConfigBuilder {
    width: Option<usize>,
    height: Option<usize>,
    light_count: Option<usize>,
    reference_white: Option<Vec<f32>>,
    register: Option<bool>,
    binarize_targets: Option<bool>,
    archive_path: Option<PathBuf>,
    archive_compression: Option<ArchiveCompression>,
    illuminant_name: Option<String>,
}

impl EngineConfigBuilder {
    pub fn dimensions(mut self, width: usize, height: usize) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn light_count(mut self, count: usize) -> Self {
        self.light_count = Some(count);
        self
    }

    pub fn reference_white(mut self, values: Vec<f32>) -> Self {
        self.reference_white = Some(values);
        self
    }

    pub fn register(mut self, enable: bool) -> Self {
        self.register = Some(enable);
        self
    }

    pub fn binarize_targets(mut self, enable: bool) -> Self {
        self.binarize_targets = Some(enable);
        self
    }

    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    pub fn archive_compression(mut self, compression: ArchiveCompression) -> Self {
        self.archive_compression = Some(compression);
        self
    }

    pub fn illuminant_name(mut self, name: impl Into<String>) -> Self {
        self.illuminant_name = Some(name.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            width: self.width.unwrap_or(default.width),
            height: self.height.unwrap_or(default.height),
            light_count: self.light_count.unwrap_or(default.light_count),
            reference_white: self.reference_white.or(default.reference_white),
            register: self.register.unwrap_or(default.register),
            binarize_targets: self.binarize_targets.unwrap_or(default.binarize_targets),
            archive_path: self.archive_path.or(default.archive_path),
            archive_compression: self
                .archive_compression
                .unwrap_or(default.archive_compression),
            illuminant_name: self.illuminant_name.or(default.illuminant_name),
        }
    }
}
