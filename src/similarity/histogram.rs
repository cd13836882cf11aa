//! Coarse-binned RGB histogram intersection. The cheap metric: it samples
//! a stride of pixels rather than every pixel and compares normalized bin
//! mass, so two pages with similar ink coverage score high even before any
//! structural analysis. Used on its own in the fast profile and as the
//! scorer's quick pre-filter.

use crate::config::subsystems::SimilarityConfig;
use crate::types::RasterImage;

/// Similarity in [0, 1] via histogram intersection of the two images.
/// Dimensions may differ; histograms are normalized before comparison.
pub fn similarity(a: &RasterImage, b: &RasterImage, config: &SimilarityConfig) -> f64 {
    let bins = config.histogram_bins;
    let hist_a = build_histogram(a, bins, config.sample_stride);
    let hist_b = build_histogram(b, bins, config.sample_stride);

    intersect(&hist_a, &hist_b)
}

/// Normalized histogram with `bins` buckets per RGB channel, concatenated
/// into one vector. Sampling stride trades accuracy for speed.
fn build_histogram(image: &RasterImage, bins: usize, stride: usize) -> Vec<f64> {
    let stride = stride.max(1) as u32;
    let mut counts = vec![0u64; bins * 3];
    let bucket_width = 256usize.div_ceil(bins);

    let mut sampled = 0u64;
    let mut y = 0;
    while y < image.height() {
        let mut x = 0;
        while x < image.width() {
            let [r, g, b] = image.rgb(x, y);
            counts[r as usize / bucket_width] += 1;
            counts[bins + g as usize / bucket_width] += 1;
            counts[2 * bins + b as usize / bucket_width] += 1;
            sampled += 1;
            x += stride;
        }
        y += stride;
    }

    if sampled == 0 {
        return vec![0.0; bins * 3];
    }

    // Each channel contributes `sampled` counts
    counts.iter().map(|&c| c as f64 / sampled as f64).collect()
}

fn intersect(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let shared: f64 = a.iter().zip(b.iter()).map(|(x, y)| x.min(*y)).sum();
    // Three channels each sum to 1, so full overlap is 3.0
    (shared / 3.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::raster::solid;
    use crate::types::{ColorSpace, RasterImage};

    fn cfg() -> SimilarityConfig {
        SimilarityConfig::default()
    }

    #[test]
    fn identical_images_score_one() {
        let img = solid(64, 64, 77);
        let score = similarity(&img, &img, &cfg());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn black_vs_white_scores_zero() {
        let black = solid(64, 64, 0);
        let white = solid(64, 64, 255);
        let score = similarity(&black, &white, &cfg());
        assert!(score < 1e-9, "got {}", score);
    }

    #[test]
    fn dimension_mismatch_is_tolerated() {
        let a = solid(64, 64, 100);
        let b = solid(31, 97, 100);
        let score = similarity(&a, &b, &cfg());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rgb_and_gray_agree_on_neutral_content() {
        let gray = solid(32, 32, 128);
        let rgb = RasterImage::new(32, 32, ColorSpace::Rgb, vec![128; 32 * 32 * 3]).unwrap();
        let score = similarity(&gray, &rgb, &cfg());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_symmetric_and_in_range() {
        let mut data = Vec::new();
        for i in 0..(48 * 48) {
            data.push((i % 251) as u8);
        }
        let a = RasterImage::new(48, 48, ColorSpace::Gray, data).unwrap();
        let b = solid(48, 48, 10);
        let ab = similarity(&a, &b, &cfg());
        let ba = similarity(&b, &a, &cfg());
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }
}
