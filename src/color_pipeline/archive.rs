//! Calibrated-plane archive
//!
//! Side-channel export of every calibrated band as one single-channel float
//! TIFF page, tagged with the reference and measured white values, plus the
//! plain TIFF writers used for finished RGB and Lab images.

pub mod tags;
mod tiff_archive;
pub mod types;
mod writer;


pub use tags::{register_custom_tags, ArchiveTag, CustomTagRegistry};
pub use tiff_archive::{write_float_planes, write_rgb_tiff, TiffArchiveWriter};
pub use types::{ArchiveCompression, ArchivePage, CaptureMetadata};
pub use writer::SpectralArchiveWriter;
