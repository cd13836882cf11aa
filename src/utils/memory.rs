// src/utils/memory.rs
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub struct MemoryMonitor {
    warning_threshold: u64,
    critical_threshold: u64,
    last_check: Mutex<Instant>,
    check_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Warning,
    Critical,
}

impl MemoryMonitor {
    pub fn new(warning_mb: u64, critical_mb: u64, check_interval_ms: u64) -> Self {
        MemoryMonitor {
            warning_threshold: warning_mb * 1024 * 1024,
            critical_threshold: critical_mb * 1024 * 1024,
            last_check: Mutex::new(Instant::now()),
            check_interval: Duration::from_millis(check_interval_ms),
        }
    }

    pub fn should_check(&self) -> bool {
        let mut last_check = self.last_check.lock();
        let elapsed = last_check.elapsed();

        if elapsed >= self.check_interval {
            *last_check = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn check_memory(&self) -> Option<MemoryPressure> {
        if let Ok(mem_info) = sys_info::mem_info() {
            let used = (mem_info.total - mem_info.avail) * 1024; // KB to bytes

            if used > self.critical_threshold {
                Some(MemoryPressure::Critical)
            } else if used > self.warning_threshold {
                Some(MemoryPressure::Warning)
            } else {
                None
            }
        } else {
            None
        }
    }

    /// Whether optional work (random candidate sampling) should be skipped.
    pub fn under_pressure(&self) -> bool {
        self.check_memory().is_some()
    }

    pub fn get_memory_usage_mb(&self) -> u64 {
        if let Ok(mem_info) = sys_info::mem_info() {
            (mem_info.total - mem_info.avail) / 1024 // MB
        } else {
            0
        }
    }
}
