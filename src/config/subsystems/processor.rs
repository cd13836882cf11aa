// src/config/subsystems/processor.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::FromIni;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Candidate pairs scored per sequential batch.
    pub batch_size: usize,
    /// Concurrent in-flight similarity computations (semaphore width).
    pub max_concurrent_comparisons: usize,
    /// Budget for one scoring batch. An expired batch keeps whatever
    /// scores completed.
    pub batch_timeout_ms: u64,
    /// Budget for fetching one rendered page inside a scoring task.
    pub image_fetch_timeout_ms: u64,
    /// Retries for transient per-pair failures (render hiccups).
    pub retry_count: usize,
    /// Base delay for exponential retry backoff.
    pub retry_delay_ms: u64,
    /// Budget for one page pair's content comparison.
    pub content_timeout_ms: u64,
    /// Worker threads for the scoring runtime. 0 picks the CPU count.
    pub thread_count: usize,
    /// When no difference is found but overall similarity is below the
    /// match threshold, emit one synthetic visual difference so callers
    /// always have something to show.
    pub synthesize_placeholder_difference: bool,
    pub memory_warn_threshold_mb: u64,
    pub memory_critical_threshold_mb: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_concurrent_comparisons: 4,
            batch_timeout_ms: 30_000,
            image_fetch_timeout_ms: 5_000,
            retry_count: 2,
            retry_delay_ms: 100,
            content_timeout_ms: 10_000,
            thread_count: 0,
            synthesize_placeholder_difference: true,
            memory_warn_threshold_mb: 1024 * 2,
            memory_critical_threshold_mb: 1024 * 3,
        }
    }
}

impl ProcessorConfig {
    pub fn worker_threads(&self) -> usize {
        if self.thread_count > 0 {
            self.thread_count
        } else {
            num_cpus::get()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be greater than 0".to_string()
            ));
        }
        if self.max_concurrent_comparisons == 0 {
            return Err(Error::Config(
                "max_concurrent_comparisons must be greater than 0".to_string()
            ));
        }
        if self.batch_timeout_ms == 0 {
            return Err(Error::Config(
                "batch_timeout_ms must be greater than 0".to_string()
            ));
        }
        if self.memory_warn_threshold_mb > self.memory_critical_threshold_mb {
            return Err(Error::Config(
                "memory_warn_threshold_mb must not exceed memory_critical_threshold_mb".to_string()
            ));
        }
        Ok(())
    }
}

impl FromIni for ProcessorConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "processor" {
            return None;
        }

        match key {
            "batch_size" => {
                match value.parse() {
                    Ok(size) if size > 0 => {
                        self.batch_size = size;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid batch_size (must be > 0): {}", value)
                    ))),
                }
            },
            "max_concurrent_comparisons" => {
                match value.parse() {
                    Ok(count) if count > 0 => {
                        self.max_concurrent_comparisons = count;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid max_concurrent_comparisons (must be > 0): {}", value)
                    ))),
                }
            },
            "batch_timeout_ms" => {
                match value.parse() {
                    Ok(ms) if ms > 0 => {
                        self.batch_timeout_ms = ms;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid batch_timeout_ms (must be > 0): {}", value)
                    ))),
                }
            },
            "image_fetch_timeout_ms" => {
                match value.parse() {
                    Ok(ms) if ms > 0 => {
                        self.image_fetch_timeout_ms = ms;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid image_fetch_timeout_ms (must be > 0): {}", value)
                    ))),
                }
            },
            "retry_count" => {
                match value.parse() {
                    Ok(count) => {
                        self.retry_count = count;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid retry_count: {}", value)
                    ))),
                }
            },
            "retry_delay_ms" => {
                match value.parse() {
                    Ok(ms) => {
                        self.retry_delay_ms = ms;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid retry_delay_ms: {}", value)
                    ))),
                }
            },
            "content_timeout_ms" => {
                match value.parse() {
                    Ok(ms) if ms > 0 => {
                        self.content_timeout_ms = ms;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid content_timeout_ms (must be > 0): {}", value)
                    ))),
                }
            },
            "thread_count" => {
                match value.parse() {
                    Ok(count) => {
                        self.thread_count = count;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid thread_count: {}", value)
                    ))),
                }
            },
            "synthesize_placeholder_difference" => {
                match value.parse::<bool>() {
                    Ok(val) => {
                        self.synthesize_placeholder_difference = val;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid synthesize_placeholder_difference (must be true or false): {}", value)
                    ))),
                }
            },
            "memory_warn_threshold_mb" => {
                match value.parse() {
                    Ok(mb) => {
                        self.memory_warn_threshold_mb = mb;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid memory_warn_threshold_mb: {}", value)
                    ))),
                }
            },
            "memory_critical_threshold_mb" => {
                match value.parse() {
                    Ok(mb) => {
                        self.memory_critical_threshold_mb = mb;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid memory_critical_threshold_mb: {}", value)
                    ))),
                }
            },
            _ => None,
        }
    }
}
