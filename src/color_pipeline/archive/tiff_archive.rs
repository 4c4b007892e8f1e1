use std::io::{Cursor, Write};
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, info, instrument};

use crate::color_pipeline::archive::tags::{register_custom_tags, ArchiveTag, CustomTagRegistry};
use crate::color_pipeline::archive::types::{ArchiveCompression, ArchivePage, CaptureMetadata};
use crate::color_pipeline::archive::writer::SpectralArchiveWriter;
use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::image::{MultiPlaneImage, RgbImage};

/// NewSubfileType value marking one page of a multi-page file.
const SUBFILE_PAGE: u32 = 2;
const NEW_SUBFILE_TYPE: Tag = Tag::Unknown(254);
const PAGE_NUMBER: Tag = Tag::Unknown(297);

fn encode_err(e: tiff::TiffError) -> ColorError {
    ColorError::EncodeError(e.to_string())
}

/// Multi-page float TIFF archive of calibrated band planes.
pub struct TiffArchiveWriter {
    capture: CaptureMetadata,
    compression: ArchiveCompression,
    tags: CustomTagRegistry,
    pages: Vec<ArchivePage>,
}

impl TiffArchiveWriter {
    pub fn new(capture: CaptureMetadata, compression: ArchiveCompression) -> Self {
        Self {
            capture,
            compression,
            tags: CustomTagRegistry::default(),
            pages: Vec::new(),
        }
    }

    /// Must run once before the archive is written; repeated calls are no-ops.
    pub fn register_custom_tags(&mut self) -> bool {
        register_custom_tags(&mut self.tags)
    }

    pub fn capture(&self) -> &CaptureMetadata {
        &self.capture
    }

    pub fn pages(&self) -> &[ArchivePage] {
        &self.pages
    }

    #[instrument(skip(self, path))]
    pub fn write_archive_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut file = std::fs::File::create(path).map_err(|e| {
            ColorError::OutputWriteError(format!("{}: {}", path.display(), e))
        })?;
        self.write_archive(&mut file)?;
        info!(path = %path.display(), pages = self.pages.len(), "Archive written");
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(encode_err)?
            .with_compression(self.compression.encoder_compression());

        let total = u16::try_from(self.pages.len()).unwrap_or(u16::MAX);
        for (index, page) in self.pages.iter().enumerate() {
            let index = u16::try_from(index).unwrap_or(u16::MAX);
            let mut image = encoder
                .new_image::<colortype::Gray32Float>(page.width as u32, page.height as u32)
                .map_err(encode_err)?;

            let dir = image.encoder();
            dir.write_tag(NEW_SUBFILE_TYPE, SUBFILE_PAGE).map_err(encode_err)?;
            dir.write_tag(PAGE_NUMBER, &[index, total][..]).map_err(encode_err)?;

            let capture = &self.capture;
            let registered = |tag: ArchiveTag| self.tags.contains(tag);
            if registered(ArchiveTag::XBinning) {
                dir.write_tag(ArchiveTag::XBinning.tag(), capture.x_binning).map_err(encode_err)?;
            }
            if registered(ArchiveTag::YBinning) {
                dir.write_tag(ArchiveTag::YBinning.tag(), capture.y_binning).map_err(encode_err)?;
            }
            if registered(ArchiveTag::FilterCount) {
                dir.write_tag(ArchiveTag::FilterCount.tag(), capture.filter_count)
                    .map_err(encode_err)?;
            }
            if registered(ArchiveTag::LightCount) {
                dir.write_tag(ArchiveTag::LightCount.tag(), capture.light_count)
                    .map_err(encode_err)?;
            }
            if let (true, Some(name)) = (registered(ArchiveTag::Illuminant), &capture.illuminant) {
                dir.write_tag(ArchiveTag::Illuminant.tag(), name.as_str()).map_err(encode_err)?;
            }
            if let (true, Some(rect)) = (registered(ArchiveTag::WhitePointX), capture.white_rect) {
                dir.write_tag(ArchiveTag::WhitePointX.tag(), rect.x as u32).map_err(encode_err)?;
                dir.write_tag(ArchiveTag::WhitePointY.tag(), rect.y as u32).map_err(encode_err)?;
            }
            if registered(ArchiveTag::ReferenceWhite) {
                dir.write_tag(ArchiveTag::ReferenceWhite.tag(), page.reference_white)
                    .map_err(encode_err)?;
            }
            if let (true, Some(measured)) =
                (registered(ArchiveTag::MeasuredWhite), page.measured_white)
            {
                dir.write_tag(ArchiveTag::MeasuredWhite.tag(), measured).map_err(encode_err)?;
            }
            if registered(ArchiveTag::Wavelength) {
                dir.write_tag(ArchiveTag::Wavelength.tag(), page.wavelength).map_err(encode_err)?;
                dir.write_tag(ArchiveTag::LightIndex.tag(), page.light as u32).map_err(encode_err)?;
            }

            image.write_data(&page.data).map_err(encode_err)?;
        }
        drop(encoder);
        Ok(buffer)
    }
}

impl SpectralArchiveWriter for TiffArchiveWriter {
    fn add_page(&mut self, page: ArchivePage) -> Result<()> {
        if page.width == 0 || page.height == 0 {
            return Err(ColorError::InvalidDimensions(page.width, page.height));
        }
        if page.data.len() != page.width * page.height {
            return Err(ColorError::ShapeMismatch {
                expected: (page.width, page.height),
                found: (page.data.len(), 1),
            });
        }
        debug!(
            wavelength = page.wavelength,
            light = page.light,
            measured = ?page.measured_white,
            "Archive page queued"
        );
        self.pages.push(page);
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn write_archive(&mut self, output: &mut dyn Write) -> Result<()> {
        if !self.tags.is_registered() {
            return Err(ColorError::EncodeError(
                "custom archive tags not registered".to_string(),
            ));
        }
        if self.pages.is_empty() {
            return Err(ColorError::EncodeError("archive has no pages".to_string()));
        }
        let buffer = self.encode()?;
        output.write_all(&buffer)?;
        debug!(pages = self.pages.len(), bytes = buffer.len(), "Archive encoded");
        Ok(())
    }
}

/// Writes an 8-bit RGB image as a single interleaved TIFF page.
pub fn write_rgb_tiff(
    image: &RgbImage,
    output: &mut dyn Write,
    compression: ArchiveCompression,
) -> Result<()> {
    debug!("Encoding RGB TIFF image: {}x{}", image.width(), image.height());
    let interleaved = image.to_interleaved()?;

    let mut buffer = Vec::new();
    {
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(encode_err)?
            .with_compression(compression.encoder_compression());
        encoder
            .write_image::<colortype::RGB8>(image.width() as u32, image.height() as u32, &interleaved)
            .map_err(encode_err)?;
    }
    output.write_all(&buffer)?;
    Ok(())
}

/// Writes each plane of a float image as its own single-channel page.
pub fn write_float_planes(
    image: &MultiPlaneImage<f32>,
    output: &mut dyn Write,
    compression: ArchiveCompression,
) -> Result<()> {
    let mut buffer = Vec::new();
    {
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(encode_err)?
            .with_compression(compression.encoder_compression());
        for plane in image.planes() {
            encoder
                .write_image::<colortype::Gray32Float>(
                    image.width() as u32,
                    image.height() as u32,
                    plane,
                )
                .map_err(encode_err)?;
        }
    }
    output.write_all(&buffer)?;
    Ok(())
}
