pub mod image_cache;
pub mod score_cache;
pub mod result_cache;

pub use image_cache::ImageCache;
pub use score_cache::ScoreCache;
pub use result_cache::ResultCache;
