use crate::color_pipeline::common::error::Result;
use crate::color_pipeline::image::RawFrame;

pub trait FrameReader {
    fn read_frame(&self, data: &[u8]) -> Result<RawFrame>;
}
