//! Concurrent similarity-score cache shared by all scoring workers within
//! a matcher instance. Races where two workers score the same pair are
//! benign: both write the same deterministic value and the last one wins.
//! The cache is capacity-bounded; when it fills, the oldest eighth of the
//! entries is dropped in one pass so eviction cost stays amortized.

use std::time::Instant;

use dashmap::DashMap;
use log::debug;

use crate::types::SimilarityKey;

const DEFAULT_CAPACITY: usize = 100_000;

struct ScoreEntry {
    score: f64,
    inserted: Instant,
}

pub struct ScoreCache {
    scores: DashMap<SimilarityKey, ScoreEntry>,
    capacity: usize,
}

impl Default for ScoreCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scores: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &SimilarityKey) -> Option<f64> {
        self.scores.get(key).map(|entry| entry.score)
    }

    pub fn contains(&self, key: &SimilarityKey) -> bool {
        self.scores.contains_key(key)
    }

    pub fn insert(&self, key: SimilarityKey, score: f64) {
        if self.scores.len() >= self.capacity && !self.scores.contains_key(&key) {
            self.evict_oldest();
        }
        self.scores.insert(key, ScoreEntry {
            score: score.clamp(0.0, 1.0),
            inserted: Instant::now(),
        });
    }

    /// Drops the oldest eighth of the entries (at least one) in a single
    /// scan, so the scan cost amortizes over many inserts.
    fn evict_oldest(&self) {
        let mut entries: Vec<(SimilarityKey, Instant)> = self
            .scores
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().inserted))
            .collect();
        entries.sort_by_key(|(_, inserted)| *inserted);

        let drop_count = (self.capacity / 8).max(1);
        for (key, _) in entries.into_iter().take(drop_count) {
            self.scores.remove(&key);
        }
        debug!("Score cache full, evicted {} oldest entries", drop_count);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn clear(&self) {
        self.scores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn key(base_page: u32, compare_page: u32) -> SimilarityKey {
        SimilarityKey::new(&DocumentId::from("base"), base_page, &DocumentId::from("cmp"), compare_page)
    }

    #[test]
    fn insert_and_get() {
        let cache = ScoreCache::new();
        cache.insert(key(1, 1), 0.9);
        assert_eq!(cache.get(&key(1, 1)), Some(0.9));
        assert_eq!(cache.get(&key(1, 2)), None);
    }

    #[test]
    fn scores_are_clamped() {
        let cache = ScoreCache::new();
        cache.insert(key(1, 1), 1.7);
        assert_eq!(cache.get(&key(1, 1)), Some(1.0));
    }

    #[test]
    fn composite_key_distinguishes_directions() {
        let cache = ScoreCache::new();
        cache.insert(key(1, 2), 0.5);
        assert!(!cache.contains(&key(2, 1)));
    }

    #[test]
    fn capacity_is_bounded_with_oldest_evicted_first() {
        let cache = ScoreCache::with_capacity(16);
        for page in 1..=40 {
            cache.insert(key(page, page), 0.5);
        }

        assert!(cache.len() <= 16);
        // The newest entry always survives eviction
        assert!(cache.contains(&key(40, 40)));
        // The very first entries were evicted along the way
        assert!(!cache.contains(&key(1, 1)));
    }

    #[test]
    fn rewriting_an_existing_key_does_not_evict() {
        let cache = ScoreCache::with_capacity(4);
        for page in 1..=4 {
            cache.insert(key(page, page), 0.5);
        }
        cache.insert(key(2, 2), 0.9);

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&key(2, 2)), Some(0.9));
        assert!(cache.contains(&key(1, 1)));
    }
}
