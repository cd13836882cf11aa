//! Windowed structural similarity (SSIM). The accurate metric: luminance,
//! contrast, and structure statistics over 8x8 windows with the standard
//! stabilizing constants. A sampled quick-compare runs first and returns
//! directly when the pair is clearly identical or clearly different; the
//! expensive windowed pass only runs for the ambiguous middle. Large
//! images stride their windows and spread row bands across the rayon pool.

use log::{debug, warn};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::subsystems::SimilarityConfig;
use crate::similarity::raster;
use crate::types::RasterImage;

const WINDOW: usize = 8;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Structural similarity of two images in [0, 1]. Reflexive and, for
/// equal-dimension inputs, symmetric. Never returns NaN.
pub fn ssim(a: &RasterImage, b: &RasterImage, config: &SimilarityConfig) -> f64 {
    let gray_a = raster::to_gray(a);
    let gray_b = raster::to_gray(b);

    // Equalize dimensions by resampling the smaller image, so the result
    // does not depend on argument order.
    let (gray_a, gray_b) = if gray_a.width() != gray_b.width() || gray_a.height() != gray_b.height() {
        if gray_a.pixel_count() < gray_b.pixel_count() {
            let resized = raster::resize_bilinear(&gray_a, gray_b.width(), gray_b.height());
            (resized, gray_b)
        } else {
            let resized = raster::resize_bilinear(&gray_b, gray_a.width(), gray_a.height());
            (gray_a, resized)
        }
    } else {
        (gray_a, gray_b)
    };

    let quick = quick_similarity(&gray_a, &gray_b, config.sample_stride);
    if quick <= config.quick_low_threshold || quick >= config.quick_high_threshold {
        debug!("Quick compare short-circuit: {:.3}", quick);
        return quick.clamp(0.0, 1.0);
    }

    let width = gray_a.width() as usize;
    let height = gray_a.height() as usize;

    // Images smaller than one window get a single whole-image pass.
    if width < WINDOW || height < WINDOW {
        return window_ssim(gray_a.data(), gray_b.data(), width, 0, 0, width, height)
            .clamp(0.0, 1.0);
    }

    let pixels = width * height;
    let step = if pixels > config.window_stride_pixel_threshold { 2 } else { 1 };

    let result = if pixels > config.parallel_pixel_threshold {
        // Worker panics must not take the whole call down; recompute
        // sequentially instead.
        match catch_unwind(AssertUnwindSafe(|| {
            windowed_ssim_parallel(gray_a.data(), gray_b.data(), width, height, step)
        })) {
            Ok(score) => score,
            Err(_) => {
                warn!("Parallel SSIM pass failed, falling back to sequential");
                windowed_ssim_rows(gray_a.data(), gray_b.data(), width, 0, height, step)
                    .into_score()
            }
        }
    } else {
        windowed_ssim_rows(gray_a.data(), gray_b.data(), width, 0, height, step).into_score()
    };

    result.clamp(0.0, 1.0)
}

/// Sampled mean-absolute-difference similarity. Cheap enough to run on
/// every pair; only its extremes are trusted.
fn quick_similarity(a: &RasterImage, b: &RasterImage, stride: usize) -> f64 {
    let stride = stride.max(1) as u32;
    let mut total: u64 = 0;
    let mut samples: u64 = 0;

    let mut y = 0;
    while y < a.height() {
        let mut x = 0;
        while x < a.width() {
            total += (a.luma(x, y) as i64 - b.luma(x, y) as i64).unsigned_abs();
            samples += 1;
            x += stride;
        }
        y += stride;
    }

    if samples == 0 {
        return 0.0;
    }
    1.0 - (total as f64 / samples as f64) / 255.0
}

/// Partial sums from one slice of the windowed pass, combined by
/// window-count weighting.
struct PartialSsim {
    sum: f64,
    windows: usize,
}

impl PartialSsim {
    fn into_score(self) -> f64 {
        if self.windows == 0 {
            return 0.0;
        }
        self.sum / self.windows as f64
    }
}

fn windowed_ssim_rows(a: &[u8], b: &[u8], width: usize, row_start: usize, row_end: usize, step: usize) -> PartialSsim {
    let mut sum = 0.0;
    let mut windows = 0usize;

    let mut y = row_start;
    while y + WINDOW <= row_end {
        let mut x = 0;
        while x + WINDOW <= width {
            sum += window_ssim(a, b, width, x, y, WINDOW, WINDOW);
            windows += 1;
            x += WINDOW * step;
        }
        y += WINDOW * step;
    }

    PartialSsim { sum, windows }
}

fn windowed_ssim_parallel(a: &[u8], b: &[u8], width: usize, height: usize, step: usize) -> f64 {
    // Bands are multiples of the window stride so no window straddles a
    // band boundary.
    let band_rows = (WINDOW * step) * 16;
    let band_starts: Vec<usize> = (0..height).step_by(band_rows).collect();

    let partials: Vec<PartialSsim> = band_starts
        .into_par_iter()
        .map(|start| {
            let end = (start + band_rows).min(height);
            windowed_ssim_rows(a, b, width, start, end, step)
        })
        .collect();

    let windows: usize = partials.iter().map(|p| p.windows).sum();
    if windows == 0 {
        return 0.0;
    }
    let sum: f64 = partials.iter().map(|p| p.sum).sum();
    sum / windows as f64
}

/// Standard SSIM over one window: means, variances, and covariance fed
/// through the stabilized luminance/contrast/structure formula.
fn window_ssim(a: &[u8], b: &[u8], width: usize, x0: usize, y0: usize, win_w: usize, win_h: usize) -> f64 {
    let n = (win_w * win_h) as f64;
    if n == 0.0 {
        return 0.0;
    }

    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    for y in y0..y0 + win_h {
        let row = y * width;
        for x in x0..x0 + win_w {
            sum_a += a[row + x] as f64;
            sum_b += b[row + x] as f64;
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut covar = 0.0;
    for y in y0..y0 + win_h {
        let row = y * width;
        for x in x0..x0 + win_w {
            let da = a[row + x] as f64 - mean_a;
            let db = b[row + x] as f64 - mean_b;
            var_a += da * da;
            var_b += db * db;
            covar += da * db;
        }
    }
    var_a /= n;
    var_b /= n;
    covar /= n;

    let numerator = (2.0 * mean_a * mean_b + C1) * (2.0 * covar + C2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2);

    if denominator <= 0.0 {
        return 1.0;
    }
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::raster::solid;
    use crate::types::{ColorSpace, RasterImage};

    fn cfg() -> SimilarityConfig {
        SimilarityConfig::default()
    }

    fn noisy(width: u32, height: u32, seed: u64) -> RasterImage {
        let rng = fastrand::Rng::with_seed(seed);
        let data: Vec<u8> = (0..width as usize * height as usize)
            .map(|_| rng.u8(..))
            .collect();
        RasterImage::new(width, height, ColorSpace::Gray, data).unwrap()
    }

    #[test]
    fn identical_images_score_one() {
        let img = noisy(64, 64, 7);
        assert_eq!(ssim(&img, &img, &cfg()), 1.0);
    }

    #[test]
    fn symmetric_for_equal_dimensions() {
        let a = noisy(64, 64, 1);
        let b = noisy(64, 64, 2);
        let ab = ssim(&a, &b, &cfg());
        let ba = ssim(&b, &a, &cfg());
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn black_vs_white_is_clearly_different() {
        let black = solid(64, 64, 0);
        let white = solid(64, 64, 255);
        let score = ssim(&black, &white, &cfg());
        assert!(score <= 0.1, "got {}", score);
    }

    #[test]
    fn score_always_in_range() {
        let a = noisy(40, 30, 3);
        let b = solid(40, 30, 128);
        let score = ssim(&a, &b, &cfg());
        assert!((0.0..=1.0).contains(&score));
        assert!(!score.is_nan());
    }

    #[test]
    fn tiny_images_use_whole_image_pass() {
        let a = solid(4, 4, 100);
        let b = solid(4, 4, 100);
        assert_eq!(ssim(&a, &b, &cfg()), 1.0);

        // Force past the quick-compare window into the single-window path
        let mut config = cfg();
        config.quick_high_threshold = 1.1_f64.min(1.0);
        config.quick_low_threshold = 0.0;
        let c = solid(4, 4, 110);
        let score = ssim(&a, &c, &config);
        assert!((0.0..=1.0).contains(&score));
    }

    fn gradient(width: u32, height: u32) -> RasterImage {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + y) * 255 / (width + height - 2).max(1)) as u8);
            }
        }
        RasterImage::new(width, height, ColorSpace::Gray, data).unwrap()
    }

    #[test]
    fn mismatched_dimensions_are_resized() {
        // Resampling only preserves similarity for smooth content; noise
        // loses its high-frequency structure when downsampled
        let big = gradient(128, 128);
        let small = raster::resize_bilinear(&big, 64, 64);
        let score = ssim(&big, &small, &cfg());
        assert!(score > 0.5, "resampled image should stay similar, got {}", score);

        let noisy_big = noisy(128, 128, 9);
        let noisy_small = raster::resize_bilinear(&noisy_big, 64, 64);
        let noisy_score = ssim(&noisy_big, &noisy_small, &cfg());
        assert!((0.0..=1.0).contains(&noisy_score));
    }

    #[test]
    fn moderate_noise_lands_between_thresholds() {
        let a = noisy(64, 64, 11);
        // Perturb a copy slightly so the quick compare cannot short-circuit
        let data: Vec<u8> = a.data().iter()
            .enumerate()
            .map(|(i, &p)| if i % 3 == 0 { p.saturating_add(40) } else { p })
            .collect();
        let b = RasterImage::new(64, 64, ColorSpace::Gray, data).unwrap();
        let score = ssim(&a, &b, &cfg());
        assert!(score > 0.0 && score < 1.0);
    }
}
