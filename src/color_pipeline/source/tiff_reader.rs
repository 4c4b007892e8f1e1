use std::io::Cursor;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;
use tracing::debug;

use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::RawFrame;
use crate::color_pipeline::source::reader::FrameReader;

fn decode_err(e: tiff::TiffError) -> ColorError {
    ColorError::DecodeError(e.to_string())
}

/// Reads the first page of a single-channel 8- or 16-bit TIFF.
pub struct TiffFrameReader;

impl FrameReader for TiffFrameReader {
    fn read_frame(&self, data: &[u8]) -> Result<RawFrame> {
        let mut decoder = Decoder::new(Cursor::new(data)).map_err(decode_err)?;
        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let bits = match decoder.colortype().map_err(decode_err)? {
            ColorType::Gray(bits) => bits,
            other => {
                return Err(ColorError::DecodeError(format!(
                    "expected a grayscale frame, found {:?}",
                    other
                )));
            }
        };

        let samples = match decoder.read_image().map_err(decode_err)? {
            DecodingResult::U16(values) => values,
            DecodingResult::U8(values) => values.into_iter().map(u16::from).collect(),
            _ => {
                return Err(ColorError::DecodeError(format!(
                    "unsupported {}-bit sample format",
                    bits
                )));
            }
        };

        let frame = RawFrame::new(width as usize, height as usize, samples)?;
        debug!(width, height, bits, "TIFF frame decoded");
        Ok(frame)
    }
}
