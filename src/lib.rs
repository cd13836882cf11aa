//! Paginated document comparison engine. Pages of two documents are
//! matched under uncertainty using perceptual similarity (difference
//! hash, color histogram, SSIM), a bounded candidate search, and
//! minimum-cost assignment; matched pairs are then diffed for text and
//! image content. Rendering and extraction are supplied by the caller
//! through the traits in [`render`].

pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod matcher;
pub mod render;
pub mod similarity;
pub mod types;
pub mod utils;

pub use compare::{ContentComparators, DocumentComparer};
pub use config::PagematchConfig;
pub use error::{Error, Result};
pub use matcher::DocumentMatcher;
pub use render::{ImageExtractor, ImageRef, NoopProgress, PageRenderer, ProgressReporter, TextExtractor};
pub use types::{
    ColorSpace, ComparisonResult, Difference, DifferenceKind, Document, DocumentId, MatchReport,
    MatchStrategyKind, Page, PagePair, PageRegion, RasterImage, Severity, SimilarityKey, Summary,
};
