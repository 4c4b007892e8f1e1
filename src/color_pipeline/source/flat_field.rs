use std::path::Path;

use tracing::{info, instrument};

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::{FlatFieldImage, RawFrame};
use crate::color_pipeline::source::reader::FrameReader;

/// Reads and decodes one frame from disk.
pub fn read_frame_file<R: FrameReader + ?Sized, P: AsRef<Path>>(reader: &R, path: P) -> Result<RawFrame> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| ColorError::InputReadError(format!("{}: {}", path.display(), e)))?;
    reader.read_frame(&data)
}

/// Stacks one frame per configured wavelength, in filter order, into the
/// flat-field image for a single light source.
#[instrument(skip(reader, paths), fields(bands = paths.len()))]
pub fn load_flat_field<R: FrameReader + ?Sized, P: AsRef<Path>>(
    reader: &R,
    paths: &[P],
) -> Result<FlatFieldImage> {
    let mut frames = paths.iter().map(|p| read_frame_file(reader, p));
    let first = frames
        .next()
        .ok_or_else(|| ColorError::InputReadError("no flat-field frames given".to_string()))??;
    let (width, height) = first.dimensions();

    let mut planes = Vec::with_capacity(paths.len());
    planes.push(first.data);
    for frame in frames {
        let frame = frame?;
        frame.check_shape(width, height)?;
        planes.push(frame.data);
    }
    info!(width, height, bands = planes.len(), "Flat field loaded");
    FlatFieldImage::from_planes(width, height, planes)
}
