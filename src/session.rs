//! Capture sessions described on disk
//!
//! A session file is JSON naming the spectral tables, the filter layout, the
//! calibration frames and the capture frames of one acquisition, plus where
//! the rendered outputs go. Relative paths resolve against the directory that
//! holds the session file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::color_pipeline::archive::{write_float_planes, write_rgb_tiff, ArchiveCompression};
use crate::color_pipeline::common::{ColorError, Rect, Result};
use crate::color_pipeline::engine::{ColorEngine, EngineConfig, EngineReport};
use crate::color_pipeline::filter::{FilterConfiguration, FilterLayout, FilterPreset};
use crate::color_pipeline::fusion::{uniform_weights, weights_from_levels};
use crate::color_pipeline::source::{
    load_flat_field, read_frame_file, FrameReader, RawLoaderReader, TiffFrameReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    #[default]
    Tiff,
    Raw,
}

impl FrameFormat {
    pub fn reader(self) -> Box<dyn FrameReader> {
        match self {
            FrameFormat::Tiff => Box::new(TiffFrameReader),
            FrameFormat::Raw => Box::new(RawLoaderReader),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionOutput {
    /// 8-bit display TIFF.
    pub rgb: PathBuf,
    /// Lab planes as a three-page float TIFF.
    #[serde(default)]
    pub lab: Option<PathBuf>,
    /// Calibrated float archive written by the engine.
    #[serde(default)]
    pub archive: Option<PathBuf>,
    #[serde(default)]
    pub compression: ArchiveCompression,
    #[serde(default)]
    pub crop: Option<Rect>,
    /// Resample the master to this width before rendering.
    #[serde(default)]
    pub preview_width: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub cmf: PathBuf,
    pub illuminant: PathBuf,
    #[serde(default)]
    pub illuminant_name: Option<String>,
    /// Filter wheel preset; ignored when `wavelengths` is given.
    #[serde(default)]
    pub preset: Option<FilterPreset>,
    #[serde(default)]
    pub wavelengths: Option<Vec<u32>>,
    pub width: usize,
    pub height: usize,
    #[serde(default = "default_lights")]
    pub lights: usize,
    #[serde(default)]
    pub frame_format: FrameFormat,
    pub bias: PathBuf,
    /// One list per light, one frame per filter slot.
    pub flat_fields: Vec<Vec<PathBuf>>,
    /// Capture frames, filter-major then light.
    pub frames: Vec<PathBuf>,
    #[serde(default)]
    pub white_rect: Option<Rect>,
    #[serde(default)]
    pub reference_white: Option<Vec<f32>>,
    /// Registration runs only when targets are given.
    #[serde(default)]
    pub registration_targets: Option<Vec<Rect>>,
    #[serde(default = "default_binarize")]
    pub binarize_targets: bool,
    #[serde(default)]
    pub weights: Option<Vec<f32>>,
    #[serde(default)]
    pub levels: Option<Vec<u32>>,
    pub output: SessionOutput,

    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_lights() -> usize {
    1
}

fn default_binarize() -> bool {
    true
}

/// Result of [`SessionConfig::run`].
#[derive(Debug)]
pub struct SessionOutcome {
    pub report: EngineReport,
    pub rgb_path: PathBuf,
    pub lab_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ColorError::SessionInvalid(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ColorError::InputReadError(format!("{}: {}", path.display(), e)))?;
        let mut session = Self::from_json(&text)?;
        session.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(session)
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn layout(&self) -> Result<FilterLayout> {
        match (&self.wavelengths, self.preset) {
            (Some(wavelengths), _) => Ok(FilterLayout::from_wavelengths(wavelengths.clone())),
            (None, Some(preset)) => Ok(preset.layout()),
            (None, None) => Err(ColorError::SessionInvalid(
                "either `preset` or `wavelengths` is required".to_string(),
            )),
        }
    }

    pub fn filter_configuration(&self) -> Result<FilterConfiguration> {
        let filters = FilterConfiguration::from_files(
            self.layout()?,
            self.resolve(&self.cmf),
            self.resolve(&self.illuminant),
        )?;
        filters.validate()?;
        Ok(filters)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut builder = EngineConfig::builder()
            .dimensions(self.width, self.height)
            .light_count(self.lights)
            .register(self.registration_targets.is_some())
            .binarize_targets(self.binarize_targets)
            .archive_compression(self.output.compression);
        if let Some(values) = &self.reference_white {
            builder = builder.reference_white(values.clone());
        }
        if let Some(path) = &self.output.archive {
            builder = builder.archive_path(self.resolve(path));
        }
        if let Some(name) = &self.illuminant_name {
            builder = builder.illuminant_name(name.clone());
        }
        builder.build()
    }

    /// Light weights to render with: explicit weights win over levels.
    pub fn light_weights(&self) -> Vec<f32> {
        match (&self.weights, &self.levels) {
            (Some(weights), _) => weights.clone(),
            (None, Some(levels)) => weights_from_levels(levels),
            (None, None) => uniform_weights(self.lights),
        }
    }

    /// Runs the whole capture through a [`ColorEngine`] and writes the outputs.
    #[instrument(skip(self), fields(frames = self.frames.len(), lights = self.lights))]
    pub fn run(&self) -> Result<SessionOutcome> {
        let filters = Arc::new(self.filter_configuration()?);
        let reader = self.frame_format.reader();
        let mut engine = ColorEngine::new(self.engine_config(), filters)?;

        if self.frames.len() != engine.expected_frames() {
            return Err(ColorError::SessionInvalid(format!(
                "expected {} frames ({} filters x {} lights), found {}",
                engine.expected_frames(),
                engine.band_count(),
                engine.light_count(),
                self.frames.len()
            )));
        }

        engine.add_bias(read_frame_file(reader.as_ref(), self.resolve(&self.bias))?)?;
        for paths in &self.flat_fields {
            let paths: Vec<PathBuf> = paths.iter().map(|p| self.resolve(p)).collect();
            engine.add_flat_field(load_flat_field(reader.as_ref(), &paths)?)?;
        }
        if let Some(rect) = self.white_rect {
            engine.set_wtpt(rect)?;
        }
        if let Some(targets) = &self.registration_targets {
            engine.set_reg_targets(targets)?;
        }

        engine.start_async()?;
        for path in &self.frames {
            engine.add_data_to_queue(read_frame_file(reader.as_ref(), self.resolve(path))?)?;
        }
        let report = engine
            .wait_for_thread_finish()?
            .ok_or_else(|| ColorError::EngineState("worker was not started".to_string()))?;

        let weights = self.light_weights();
        match self.output.preview_width {
            Some(width) => engine.set_light_weights_resized(&weights, width)?,
            None => engine.set_light_weights(&weights)?,
        }

        let rgb_path = self.resolve(&self.output.rgb);
        let rgb = engine.display_image(self.output.crop)?;
        write_rgb_tiff(&rgb, &mut create_output(&rgb_path)?, self.output.compression)?;
        info!(path = %rgb_path.display(), "Display image written");

        let lab_path = match &self.output.lab {
            Some(path) => {
                let path = self.resolve(path);
                let lab = engine.lab_image(self.output.crop)?;
                write_float_planes(&lab, &mut create_output(&path)?, self.output.compression)?;
                info!(path = %path.display(), "Lab planes written");
                Some(path)
            }
            None => None,
        };

        Ok(SessionOutcome {
            report,
            rgb_path,
            lab_path,
            archive_path: self.output.archive.as_deref().map(|p| self.resolve(p)),
        })
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| ColorError::OutputWriteError(format!("{}: {}", path.display(), e)))
}
