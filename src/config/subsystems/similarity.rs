// src/config/subsystems/similarity.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

/// Which metric the batch scorer uses for candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimilarityMetric {
    /// Perceptual hash Hamming similarity. Cheapest, coarsest.
    Hash,
    /// Strided RGB histogram intersection.
    Histogram,
    /// Windowed structural similarity.
    Ssim,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Hash => "hash",
            SimilarityMetric::Histogram => "histogram",
            SimilarityMetric::Ssim => "ssim",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "hash" => Some(Self::Hash),
            "histogram" => Some(Self::Histogram),
            "ssim" => Some(Self::Ssim),
            _ => None,
        }
    }
}

impl Default for SimilarityMetric {
    fn default() -> Self {
        Self::Ssim
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    pub metric: SimilarityMetric,
    /// Quick-compare result below this is "clearly different": returned
    /// directly without windowed SSIM.
    pub quick_low_threshold: f64,
    /// Quick-compare result above this is "clearly the same".
    pub quick_high_threshold: f64,
    /// Pixel stride for sampled computations (quick compare, histograms).
    pub sample_stride: usize,
    /// Bins per channel for the histogram metric.
    pub histogram_bins: usize,
    /// Pixel count above which SSIM windows stride by 2 instead of 1.
    pub window_stride_pixel_threshold: usize,
    /// Pixel count above which SSIM row bands are spread across the
    /// rayon pool.
    pub parallel_pixel_threshold: usize,
    /// Largest dimension images are downsampled to before scoring in the
    /// fast profile.
    pub downsample_max_dim: u32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::default(),
            quick_low_threshold: 0.1,
            quick_high_threshold: 0.95,
            sample_stride: 4,
            histogram_bins: 4,
            window_stride_pixel_threshold: 1_000_000,
            parallel_pixel_threshold: 4_000_000,
            downsample_max_dim: 512,
        }
    }
}

impl FromIni for SimilarityConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "similarity" {
            return None;
        }

        match key {
            "metric" => {
                self.metric = match SimilarityMetric::from_str(value) {
                    Some(metric) => metric,
                    None => return Some(Err(Error::Config(
                        format!("Invalid similarity metric: {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            "quick_low_threshold" => {
                match value.parse::<f64>() {
                    Ok(threshold) if (0.0..=1.0).contains(&threshold) => {
                        self.quick_low_threshold = threshold;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid quick_low_threshold (must be between 0 and 1): {}", value)
                    ))),
                }
            },
            "quick_high_threshold" => {
                match value.parse::<f64>() {
                    Ok(threshold) if (0.0..=1.0).contains(&threshold) => {
                        self.quick_high_threshold = threshold;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid quick_high_threshold (must be between 0 and 1): {}", value)
                    ))),
                }
            },
            "sample_stride" => {
                match value.parse() {
                    Ok(stride) if stride > 0 => {
                        self.sample_stride = stride;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid sample_stride (must be > 0): {}", value)
                    ))),
                }
            },
            "histogram_bins" => {
                match value.parse() {
                    Ok(bins) if (2..=32).contains(&bins) => {
                        self.histogram_bins = bins;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid histogram_bins (must be between 2 and 32): {}", value)
                    ))),
                }
            },
            "window_stride_pixel_threshold" => {
                match value.parse() {
                    Ok(pixels) => {
                        self.window_stride_pixel_threshold = pixels;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid window_stride_pixel_threshold: {}", value)
                    ))),
                }
            },
            "parallel_pixel_threshold" => {
                match value.parse() {
                    Ok(pixels) => {
                        self.parallel_pixel_threshold = pixels;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid parallel_pixel_threshold: {}", value)
                    ))),
                }
            },
            "downsample_max_dim" => {
                match value.parse() {
                    Ok(dim) if dim >= 16 => {
                        self.downsample_max_dim = dim;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid downsample_max_dim (must be >= 16): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quick_low_threshold >= self.quick_high_threshold {
            return Err(Error::Config(
                "quick_low_threshold must be below quick_high_threshold".to_string()
            ));
        }
        if self.sample_stride == 0 {
            return Err(Error::Config(
                "sample_stride must be greater than 0".to_string()
            ));
        }
        if !(2..=32).contains(&self.histogram_bins) {
            return Err(Error::Config(
                "histogram_bins must be between 2 and 32".to_string()
            ));
        }
        Ok(())
    }
}
