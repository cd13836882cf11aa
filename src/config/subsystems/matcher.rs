// src/config/subsystems/matcher.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

/// Accuracy/speed profile for one match operation. A single profile value
/// replaces a scattered "turbo" flag: every component that trades accuracy
/// for speed consults this one knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingProfile {
    /// Full SSIM, full candidate neighborhood, Hungarian assignment.
    Thorough,
    /// SSIM with quick-compare short circuit, adaptive neighborhood.
    Balanced,
    /// Histogram metric, downsampled images, reduced neighborhood,
    /// greedy assignment.
    Fast,
}

impl MatchingProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingProfile::Thorough => "thorough",
            MatchingProfile::Balanced => "balanced",
            MatchingProfile::Fast => "fast",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "thorough" => Some(Self::Thorough),
            "balanced" => Some(Self::Balanced),
            "fast" | "turbo" => Some(Self::Fast),
            _ => None,
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, MatchingProfile::Fast)
    }
}

impl Default for MatchingProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Accuracy/speed profile for the whole match pipeline.
    pub profile: MatchingProfile,
    /// Candidate-generation neighborhood radius around the same-index pair.
    pub max_page_gap: usize,
    /// Similarity at or above which a pair counts as a visual match.
    pub visual_similarity_threshold: f64,
    /// Overall budget for one match operation.
    pub match_timeout_secs: u64,
    /// Combined page count above which the matcher skips visual work
    /// entirely and pairs pages by index.
    pub large_document_threshold: usize,
    /// Combined page count above which the candidate neighborhood shrinks
    /// to keep total comparisons near-linear.
    pub gap_shrink_threshold: usize,
    /// Page count (larger side) above which the Hungarian solver is
    /// skipped in favor of the greedy assignment.
    pub hungarian_max_pages: usize,
    /// Stop scoring once this fraction of the smaller document's pages
    /// has a match above the similarity threshold.
    pub early_stopping_enabled: bool,
    pub early_stopping_threshold: f64,
    /// Extra random candidate pairs added for small task lists, skipped
    /// under memory pressure.
    pub random_candidates: usize,
    /// Confidence assigned when pages are paired by index with no visual
    /// evidence (simple and fallback paths).
    pub simple_match_confidence: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            profile: MatchingProfile::default(),
            max_page_gap: 3,
            visual_similarity_threshold: 0.7,
            match_timeout_secs: 180,
            large_document_threshold: 500,
            gap_shrink_threshold: 100,
            hungarian_max_pages: 150,
            early_stopping_enabled: true,
            early_stopping_threshold: 0.9,
            random_candidates: 5,
            simple_match_confidence: 0.75,
        }
    }
}

impl FromIni for MatcherConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "matcher" {
            return None;
        }

        match key {
            "profile" => {
                self.profile = match MatchingProfile::from_str(value) {
                    Some(profile) => profile,
                    None => return Some(Err(Error::Config(
                        format!("Invalid matching profile: {}", value)
                    ))),
                };
                Some(Ok(()))
            },
            "max_page_gap" => {
                match value.parse() {
                    Ok(gap) => {
                        self.max_page_gap = gap;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid max_page_gap: {}", value)
                    ))),
                }
            },
            "visual_similarity_threshold" => {
                match value.parse::<f64>() {
                    Ok(threshold) if (0.0..=1.0).contains(&threshold) => {
                        self.visual_similarity_threshold = threshold;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid visual_similarity_threshold (must be between 0 and 1): {}", value)
                    ))),
                }
            },
            "match_timeout_secs" => {
                match value.parse() {
                    Ok(secs) if secs > 0 => {
                        self.match_timeout_secs = secs;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid match_timeout_secs (must be > 0): {}", value)
                    ))),
                }
            },
            "large_document_threshold" => {
                match value.parse() {
                    Ok(pages) if pages > 0 => {
                        self.large_document_threshold = pages;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid large_document_threshold (must be > 0): {}", value)
                    ))),
                }
            },
            "gap_shrink_threshold" => {
                match value.parse() {
                    Ok(pages) if pages > 0 => {
                        self.gap_shrink_threshold = pages;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid gap_shrink_threshold (must be > 0): {}", value)
                    ))),
                }
            },
            "hungarian_max_pages" => {
                match value.parse() {
                    Ok(pages) if pages > 0 => {
                        self.hungarian_max_pages = pages;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid hungarian_max_pages (must be > 0): {}", value)
                    ))),
                }
            },
            "early_stopping_enabled" => {
                match value.parse::<bool>() {
                    Ok(val) => {
                        self.early_stopping_enabled = val;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid early_stopping_enabled (must be true or false): {}", value)
                    ))),
                }
            },
            "early_stopping_threshold" => {
                match value.parse::<f64>() {
                    Ok(threshold) if (0.0..=1.0).contains(&threshold) => {
                        self.early_stopping_threshold = threshold;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid early_stopping_threshold (must be between 0 and 1): {}", value)
                    ))),
                }
            },
            "random_candidates" => {
                match value.parse() {
                    Ok(count) => {
                        self.random_candidates = count;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid random_candidates: {}", value)
                    ))),
                }
            },
            "simple_match_confidence" => {
                match value.parse::<f64>() {
                    Ok(confidence) if (0.0..=1.0).contains(&confidence) => {
                        self.simple_match_confidence = confidence;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid simple_match_confidence (must be between 0 and 1): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.visual_similarity_threshold) {
            return Err(Error::Config(
                "visual_similarity_threshold must be between 0 and 1".to_string()
            ));
        }
        if !(0.0..=1.0).contains(&self.early_stopping_threshold) {
            return Err(Error::Config(
                "early_stopping_threshold must be between 0 and 1".to_string()
            ));
        }
        if !(0.0..=1.0).contains(&self.simple_match_confidence) {
            return Err(Error::Config(
                "simple_match_confidence must be between 0 and 1".to_string()
            ));
        }
        if self.match_timeout_secs == 0 {
            return Err(Error::Config(
                "match_timeout_secs must be greater than 0".to_string()
            ));
        }
        if self.gap_shrink_threshold > self.large_document_threshold {
            return Err(Error::Config(
                "gap_shrink_threshold must not exceed large_document_threshold".to_string()
            ));
        }
        Ok(())
    }

    /// Neighborhood radius actually used for a document pair of the given
    /// combined size. Shrinks for large documents so candidate counts stay
    /// near-linear, and again in the fast profile.
    pub fn effective_gap(&self, total_pages: usize) -> usize {
        let mut gap = self.max_page_gap;
        if self.profile.is_fast() {
            gap = gap.min(2);
        }
        if total_pages > self.gap_shrink_threshold {
            gap = gap.min(1);
        }
        gap
    }
}
