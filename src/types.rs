use serde::{Serialize, Deserialize};

/// Identifier of a loaded document. Comparisons and caches key on this,
/// never on the document's position in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a document. Page numbers are 1-based; width and height are
/// the page's nominal dimensions in points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub width: u32,
    pub height: u32,
}

/// A loaded document. The engine never mutates or copies the page list;
/// callers own the source data for the lifetime of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Gray,
    Rgb,
}

impl ColorSpace {
    pub fn channels(&self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb => 3,
        }
    }
}

/// A rendered page image. Row-major pixel buffer, 8 bits per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    colorspace: ColorSpace,
    data: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, colorspace: ColorSpace, data: Vec<u8>) -> crate::error::Result<Self> {
        let expected = width as usize * height as usize * colorspace.channels();
        if width == 0 || height == 0 {
            return Err(crate::error::Error::invalid_input(format!(
                "Zero-sized image: {}x{}", width, height
            )));
        }
        if data.len() != expected {
            return Err(crate::error::Error::invalid_input(format!(
                "Pixel buffer length {} does not match {}x{} {:?} (expected {})",
                data.len(), width, height, colorspace, expected
            )));
        }
        Ok(Self { width, height, colorspace, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn colorspace(&self) -> ColorSpace {
        self.colorspace
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Luminance of the pixel at (x, y). Gray images return the stored
    /// sample directly; RGB uses the BT.601 weights.
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let idx = (y as usize * self.width as usize + x as usize) * self.colorspace.channels();
        match self.colorspace {
            ColorSpace::Gray => self.data[idx],
            ColorSpace::Rgb => {
                let r = self.data[idx] as u32;
                let g = self.data[idx + 1] as u32;
                let b = self.data[idx + 2] as u32;
                ((299 * r + 587 * g + 114 * b) / 1000) as u8
            }
        }
    }

    /// RGB triple at (x, y). Gray pixels are replicated across channels.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * self.colorspace.channels();
        match self.colorspace {
            ColorSpace::Gray => [self.data[idx]; 3],
            ColorSpace::Rgb => [self.data[idx], self.data[idx + 1], self.data[idx + 2]],
        }
    }
}

/// Composite cache key for one scored page pair. Keeping this a proper
/// tuple type avoids the collision bugs string-concatenated keys invite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimilarityKey {
    pub base_doc: DocumentId,
    pub base_page: u32,
    pub compare_doc: DocumentId,
    pub compare_page: u32,
}

impl SimilarityKey {
    pub fn new(base_doc: &DocumentId, base_page: u32, compare_doc: &DocumentId, compare_page: u32) -> Self {
        Self {
            base_doc: base_doc.clone(),
            base_page,
            compare_doc: compare_doc.clone(),
            compare_page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferenceKind {
    Text,
    Image,
    Font,
    Visual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

/// Rectangular region on a page, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One reported difference, attached to a page pair by a content
/// comparator. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Difference {
    pub kind: DifferenceKind,
    pub severity: Severity,
    pub description: String,
    pub region: Option<PageRegion>,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A hypothesized correspondence between a base page and a compare page.
/// `base_page`/`compare_page` of `None` means the page exists only in the
/// other document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePair {
    pub base_doc: DocumentId,
    pub compare_doc: DocumentId,
    pub base_page: Option<u32>,
    pub compare_page: Option<u32>,
    pub matched: bool,
    pub similarity: f64,
    pub differences: Vec<Difference>,
}

impl PagePair {
    pub fn matched(base_doc: &DocumentId, compare_doc: &DocumentId, base_page: u32, compare_page: u32, similarity: f64) -> Self {
        Self {
            base_doc: base_doc.clone(),
            compare_doc: compare_doc.clone(),
            base_page: Some(base_page),
            compare_page: Some(compare_page),
            matched: true,
            similarity,
            differences: Vec::new(),
        }
    }

    pub fn base_only(base_doc: &DocumentId, compare_doc: &DocumentId, base_page: u32) -> Self {
        Self {
            base_doc: base_doc.clone(),
            compare_doc: compare_doc.clone(),
            base_page: Some(base_page),
            compare_page: None,
            matched: false,
            similarity: 0.0,
            differences: Vec::new(),
        }
    }

    pub fn compare_only(base_doc: &DocumentId, compare_doc: &DocumentId, compare_page: u32) -> Self {
        Self {
            base_doc: base_doc.clone(),
            compare_doc: compare_doc.clone(),
            base_page: None,
            compare_page: Some(compare_page),
            matched: false,
            similarity: 0.0,
            differences: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategyKind {
    Visual,
    Simple,
    Fallback,
}

impl MatchStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategyKind::Visual => "visual",
            MatchStrategyKind::Simple => "simple",
            MatchStrategyKind::Fallback => "fallback",
        }
    }
}

/// Output of one match operation: the page pairing plus how much to
/// trust it and which path produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub pairs: Vec<PagePair>,
    pub confidence: f64,
    pub strategy: MatchStrategyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub base_page_count: usize,
    pub compare_page_count: usize,
    pub matched_pages: usize,
    pub overall_similarity: f64,
    pub difference_count: usize,
}

/// Final result of one document comparison. Immutable once built; the
/// result cache hands out shared references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub id: String,
    pub base_doc: DocumentId,
    pub compare_doc: DocumentId,
    pub confidence: f64,
    pub strategy: MatchStrategyKind,
    pub page_pairs: Vec<PagePair>,
    pub summary: Summary,
    pub created_at: String,
}
