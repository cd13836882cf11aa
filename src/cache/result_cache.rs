//! Bounded, time-expiring cache of whole-comparison results, keyed by the
//! document-id pair. Duplicate concurrent computations for the same
//! uncached pair are tolerated; the later insert wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use log::debug;
use parking_lot::Mutex;

use crate::types::{ComparisonResult, DocumentId};

struct CachedEntry {
    result: Arc<ComparisonResult>,
    inserted: Instant,
}

pub struct ResultCache {
    entries: Mutex<AHashMap<(DocumentId, DocumentId), CachedEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(AHashMap::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, base: &DocumentId, compare: &DocumentId) -> Option<Arc<ComparisonResult>> {
        let key = (base.clone(), compare.clone());
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                debug!("Result cache hit for ({}, {})", base, compare);
                Some(Arc::clone(&entry.result))
            }
            Some(_) => {
                debug!("Result cache entry for ({}, {}) expired", base, compare);
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, result: Arc<ComparisonResult>) {
        let key = (result.base_doc.clone(), result.compare_doc.clone());
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            // Evict the oldest entry by insertion time
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(k, _)| k.clone())
            {
                debug!("Result cache full, evicting ({}, {})", oldest.0, oldest.1);
                entries.remove(&oldest);
            }
        }

        entries.insert(key, CachedEntry { result, inserted: Instant::now() });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchStrategyKind, Summary};

    fn result(base: &str, compare: &str) -> Arc<ComparisonResult> {
        Arc::new(ComparisonResult {
            id: format!("{}-{}", base, compare),
            base_doc: DocumentId::from(base),
            compare_doc: DocumentId::from(compare),
            confidence: 1.0,
            strategy: MatchStrategyKind::Visual,
            page_pairs: Vec::new(),
            summary: Summary {
                base_page_count: 0,
                compare_page_count: 0,
                matched_pages: 0,
                overall_similarity: 1.0,
                difference_count: 0,
            },
            created_at: String::new(),
        })
    }

    #[test]
    fn hit_returns_same_result() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let r = result("a", "b");
        cache.insert(Arc::clone(&r));
        let hit = cache.get(&DocumentId::from("a"), &DocumentId::from("b")).unwrap();
        assert!(Arc::ptr_eq(&hit, &r));
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = ResultCache::new(4, Duration::from_millis(10));
        cache.insert(result("a", "b"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&DocumentId::from("a"), &DocumentId::from("b")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert(result("a", "b"));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(result("c", "d"));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(result("e", "f"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&DocumentId::from("a"), &DocumentId::from("b")).is_none());
        assert!(cache.get(&DocumentId::from("e"), &DocumentId::from("f")).is_some());
    }
}
