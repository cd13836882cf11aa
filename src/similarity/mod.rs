pub mod raster;
pub mod phash;
pub mod histogram;
pub mod ssim;

use crate::config::subsystems::{SimilarityConfig, SimilarityMetric};
use crate::error::Result;
use crate::types::RasterImage;

/// Scores one image pair with the configured metric. All metrics return
/// values in [0, 1] with 1.0 meaning identical.
pub fn score(metric: SimilarityMetric, a: &RasterImage, b: &RasterImage, config: &SimilarityConfig) -> Result<f64> {
    let value = match metric {
        SimilarityMetric::Hash => phash::compare(&phash::hash(a), &phash::hash(b))?,
        SimilarityMetric::Histogram => histogram::similarity(a, b, config),
        SimilarityMetric::Ssim => ssim::ssim(a, b, config),
    };
    Ok(value.clamp(0.0, 1.0))
}
