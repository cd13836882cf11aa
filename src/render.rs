//! Traits for the external collaborators the engine depends on: page
//! rendering, content extraction, and progress reporting. Implementations
//! live with the caller; the engine only holds them behind `Arc`s.

use crate::error::Result;
use crate::types::{Document, RasterImage};

/// Renders a single page to a raster image. Must be safe to call from
/// several worker threads at once.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, document: &Document, page_number: u32, dpi: Option<u32>) -> Result<RasterImage>;
}

/// Supplies the text content of a page for the text comparator.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, document: &Document, page_number: u32) -> Result<String>;
}

/// Metadata for one embedded image on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Supplies embedded-image metadata for the image comparator.
pub trait ImageExtractor: Send + Sync {
    fn extract_images(&self, document: &Document, page_number: u32) -> Result<Vec<ImageRef>>;
}

/// Coarse progress sink. Calls are fire-and-forget: implementations must
/// not block and must not fail; the engine ignores whatever they do.
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, comparison_id: &str, completed: usize, total: usize, phase: &str);
}

/// Default reporter that drops everything on the floor.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report_progress(&self, _comparison_id: &str, _completed: usize, _total: usize, _phase: &str) {}
}
