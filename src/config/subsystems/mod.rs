pub mod matcher;
pub mod similarity;
pub mod cache;
pub mod processor;

pub use matcher::{MatcherConfig, MatchingProfile};
pub use similarity::{SimilarityConfig, SimilarityMetric};
pub use cache::CacheConfig;
pub use processor::ProcessorConfig;
