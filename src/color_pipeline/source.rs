//! Frame sources
//!
//! Readers that turn encoded files into [`RawFrame`]s for the engine queue:
//! 16-bit grayscale TIFF exports from the acquisition camera and camera RAW
//! files decoded with rawloader.

mod flat_field;
mod rawloader_reader;
mod reader;
mod tiff_reader;

pub use flat_field::{load_flat_field, read_frame_file};
pub use rawloader_reader::RawLoaderReader;
pub use reader::FrameReader;
pub use tiff_reader::TiffFrameReader;
