// src/config/subsystems/cache.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Rendered pages kept in memory at once. Eviction is LRU; evicted
    /// pages are re-rendered on the next request.
    pub image_cache_capacity: usize,
    /// How long one render call may take before the lookup fails with a
    /// render timeout.
    pub render_timeout_ms: u64,
    /// Whole-comparison results kept in memory.
    pub result_cache_capacity: usize,
    /// Age at which a cached comparison result stops being served.
    pub result_cache_ttl_secs: u64,
    /// Pair scores kept across match operations. Oldest entries are
    /// evicted in bulk when the cache fills.
    pub score_cache_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image_cache_capacity: 20,
            render_timeout_ms: 5_000,
            result_cache_capacity: 50,
            result_cache_ttl_secs: 3_600,
            score_cache_capacity: 100_000,
        }
    }
}

impl FromIni for CacheConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "cache" {
            return None;
        }

        match key {
            "image_cache_capacity" => {
                match value.parse() {
                    Ok(capacity) if capacity > 0 => {
                        self.image_cache_capacity = capacity;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid image_cache_capacity (must be > 0): {}", value)
                    ))),
                }
            },
            "render_timeout_ms" => {
                match value.parse() {
                    Ok(ms) if ms > 0 => {
                        self.render_timeout_ms = ms;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid render_timeout_ms (must be > 0): {}", value)
                    ))),
                }
            },
            "result_cache_capacity" => {
                match value.parse() {
                    Ok(capacity) if capacity > 0 => {
                        self.result_cache_capacity = capacity;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid result_cache_capacity (must be > 0): {}", value)
                    ))),
                }
            },
            "result_cache_ttl_secs" => {
                match value.parse() {
                    Ok(secs) if secs > 0 => {
                        self.result_cache_ttl_secs = secs;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid result_cache_ttl_secs (must be > 0): {}", value)
                    ))),
                }
            },
            "score_cache_capacity" => {
                match value.parse() {
                    Ok(capacity) if capacity > 0 => {
                        self.score_cache_capacity = capacity;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid score_cache_capacity (must be > 0): {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_cache_capacity == 0 {
            return Err(Error::Config(
                "image_cache_capacity must be greater than 0".to_string()
            ));
        }
        if self.result_cache_capacity == 0 {
            return Err(Error::Config(
                "result_cache_capacity must be greater than 0".to_string()
            ));
        }
        if self.score_cache_capacity == 0 {
            return Err(Error::Config(
                "score_cache_capacity must be greater than 0".to_string()
            ));
        }
        Ok(())
    }
}
