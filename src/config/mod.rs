pub mod subsystems;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use crate::error::Result;
use log::{trace, warn};

pub trait FromIni {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagematchConfig {
    pub matcher: subsystems::MatcherConfig,
    pub similarity: subsystems::SimilarityConfig,
    pub cache: subsystems::CacheConfig,
    pub processor: subsystems::ProcessorConfig,
}

impl PagematchConfig {
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.similarity.validate()?;
        self.cache.validate()?;
        self.processor.validate()?;
        Ok(())
    }

    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        let absolute_path = std::fs::canonicalize(&path)
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        trace!("Loading configuration from: {:?}", absolute_path);

        let content = fs::read_to_string(&path)?;

        let mut config = Self::default();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len()-1].to_string();
                trace!("  Line {}: Found section: [{}]", line_num + 1, current_section);
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Delegate to appropriate subsystem config
                if let Some(result) = match current_section.as_str() {
                    "matcher" => config.matcher.from_ini_section(&current_section, key, value),
                    "similarity" => config.similarity.from_ini_section(&current_section, key, value),
                    "cache" => config.cache.from_ini_section(&current_section, key, value),
                    "processor" => config.processor.from_ini_section(&current_section, key, value),
                    _ => None,
                } {
                    if let Err(e) = result {
                        warn!("Error processing config key {}={}: {}", key, value, e);
                    }
                } else {
                    warn!("Unrecognized config key: {}={} in section [{}]", key, value, current_section);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        PagematchConfig::default().validate().unwrap();
    }

    #[test]
    fn loads_ini_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "[matcher]").unwrap();
        writeln!(file, "profile = fast").unwrap();
        writeln!(file, "max_page_gap = 5").unwrap();
        writeln!(file, "visual_similarity_threshold = 0.8").unwrap();
        writeln!(file, "[similarity]").unwrap();
        writeln!(file, "metric = histogram").unwrap();
        writeln!(file, "[cache]").unwrap();
        writeln!(file, "image_cache_capacity = 8").unwrap();
        writeln!(file, "[processor]").unwrap();
        writeln!(file, "batch_size = 4").unwrap();
        file.flush().unwrap();

        let config = PagematchConfig::from_ini(file.path()).unwrap();
        assert_eq!(config.matcher.profile, subsystems::MatchingProfile::Fast);
        assert_eq!(config.matcher.max_page_gap, 5);
        assert!((config.matcher.visual_similarity_threshold - 0.8).abs() < 1e-9);
        assert_eq!(config.similarity.metric, subsystems::SimilarityMetric::Histogram);
        assert_eq!(config.cache.image_cache_capacity, 8);
        assert_eq!(config.processor.batch_size, 4);
    }

    #[test]
    fn bad_threshold_is_ignored_with_warning() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[matcher]").unwrap();
        writeln!(file, "visual_similarity_threshold = 1.5").unwrap();
        file.flush().unwrap();

        // Invalid values are logged and skipped; defaults survive.
        let config = PagematchConfig::from_ini(file.path()).unwrap();
        assert!((config.matcher.visual_similarity_threshold - 0.7).abs() < 1e-9);
    }
}
