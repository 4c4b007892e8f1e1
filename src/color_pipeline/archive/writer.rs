use std::io::Write;

use crate::color_pipeline::archive::types::ArchivePage;
use crate::color_pipeline::common::error::Result;

pub trait SpectralArchiveWriter: Send {
    /// Queues one page; pages are written in the order they are added.
    fn add_page(&mut self, page: ArchivePage) -> Result<()>;

    fn page_count(&self) -> usize;

    /// Encodes every queued page into `output` as one multi-page file.
    fn write_archive(&mut self, output: &mut dyn Write) -> Result<()>;
}
