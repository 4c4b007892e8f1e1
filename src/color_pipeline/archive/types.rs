//! Archive configuration and page types

use serde::{Deserialize, Serialize};

use crate::color_pipeline::common::Rect;

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCompression {
    /// No compression (fastest, largest file)
    #[default]
    None,
    /// LZW compression
    Lzw,
    /// Deflate compression - fast level
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

impl ArchiveCompression {
    pub(crate) fn encoder_compression(self) -> tiff::encoder::Compression {
        use tiff::encoder::compression::DeflateLevel;
        use tiff::encoder::Compression;
        match self {
            ArchiveCompression::None => Compression::Uncompressed,
            ArchiveCompression::Lzw => Compression::Lzw,
            ArchiveCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            ArchiveCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            ArchiveCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        }
    }
}

/// Tags written once per page describing the whole capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    pub filter_count: u32,
    pub light_count: u32,
    pub x_binning: u32,
    pub y_binning: u32,
    pub illuminant: Option<String>,
    pub white_rect: Option<Rect>,
}

impl Default for CaptureMetadata {
    fn default() -> Self {
        Self {
            filter_count: 0,
            light_count: 0,
            x_binning: 1,
            y_binning: 1,
            illuminant: None,
            white_rect: None,
        }
    }
}

/// One calibrated band plane with its white values.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivePage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub wavelength: u32,
    pub light: usize,
    pub reference_white: f32,
    /// White patch median before normalization; `None` when no white
    /// rectangle was configured, in which case the tag is left out.
    pub measured_white: Option<f32>,
}
