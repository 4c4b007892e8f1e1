//! Camera RAW frames via rawloader.
//!
//! The mosaic is kept as-is: each narrow-band exposure is already
//! monochromatic, so no demosaicing is applied.

use std::io::Cursor;

use rawloader::RawImageData as RawloaderImageData;
use tracing::debug;

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::RawFrame;
use crate::color_pipeline::source::reader::FrameReader;

/// Reads any RAW format rawloader can decode (ARW, RAF, NEF, DNG, ...).
pub struct RawLoaderReader;

impl FrameReader for RawLoaderReader {
    fn read_frame(&self, data: &[u8]) -> Result<RawFrame> {
        debug!("Decoding RAW frame, {} bytes", data.len());

        let decoded = rawloader::decode(&mut Cursor::new(data))
            .map_err(|e| ColorError::DecodeError(e.to_string()))?;

        // float data is normalized 0.0-1.0
        let samples: Vec<u16> = match decoded.data {
            RawloaderImageData::Integer(values) => values,
            RawloaderImageData::Float(values) => values
                .iter()
                .map(|&v| (v.clamp(0.0, 1.0) * u16::MAX as f32) as u16)
                .collect(),
        };

        let white_level = decoded.whitelevels.iter().max().copied();
        let frame = RawFrame::new(decoded.width, decoded.height, samples)?;
        debug!(
            width = frame.width,
            height = frame.height,
            ?white_level,
            "RAW frame decoded"
        );
        Ok(frame)
    }
}
