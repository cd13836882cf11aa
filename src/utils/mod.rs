pub mod memory;

pub use memory::{MemoryMonitor, MemoryPressure};
