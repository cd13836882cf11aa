//! Whole-document comparison: content comparators and the orchestrator.

pub mod content;
pub mod orchestrator;

pub use content::ContentComparators;
pub use orchestrator::DocumentComparer;
