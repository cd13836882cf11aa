//! Candidate pair generation. Instead of scoring the full cross-product,
//! the generator proposes same-index pairs first, then neighbors within a
//! bounded gap, then a handful of random long shots when resources allow.
//! Output ordering is load-bearing: the scorer walks it front to back and
//! early stopping assumes exact-index pairs come first.

use ahash::AHashSet;
use log::{debug, info};

use crate::cache::ScoreCache;
use crate::config::subsystems::MatcherConfig;
use crate::matcher::types::CandidateTask;
use crate::types::{DocumentId, SimilarityKey};
use crate::utils::MemoryMonitor;

/// Below this many generated tasks the generator tops up with random
/// pairs to catch reorderings outside the gap window.
const RANDOM_TOPUP_LIMIT: usize = 50;

pub struct CandidateGenerator<'a> {
    config: &'a MatcherConfig,
    memory: &'a MemoryMonitor,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(config: &'a MatcherConfig, memory: &'a MemoryMonitor) -> Self {
        Self { config, memory }
    }

    /// Builds the deduplicated, priority-ordered task list for one match
    /// operation. Pairs already present in the score cache are skipped.
    pub fn generate(
        &self,
        base_doc: &DocumentId,
        base_pages: u32,
        compare_doc: &DocumentId,
        compare_pages: u32,
        scores: &ScoreCache,
    ) -> Vec<CandidateTask> {
        if base_pages == 0 || compare_pages == 0 {
            return Vec::new();
        }

        let total = base_pages as usize + compare_pages as usize;
        let gap = self.config.effective_gap(total) as u32;
        debug!("Generating candidates for {}x{} pages with gap {}", base_pages, compare_pages, gap);

        let mut seen: AHashSet<(u32, u32)> = AHashSet::new();
        let mut tasks = Vec::new();

        let mut push = |tasks: &mut Vec<CandidateTask>, seen: &mut AHashSet<(u32, u32)>, base: u32, compare: u32, priority: u32| {
            if !seen.insert((base, compare)) {
                return;
            }
            let key = SimilarityKey::new(base_doc, base, compare_doc, compare);
            if scores.contains(&key) {
                return;
            }
            tasks.push(CandidateTask::new(base, compare, priority));
        };

        // Exact-index pairs across the overlap of both page ranges
        let overlap = base_pages.min(compare_pages);
        for page in 1..=overlap {
            push(&mut tasks, &mut seen, page, page, 0);
        }

        // Gap neighbors: for each base page, compare pages at +-1..gap
        for base in 1..=base_pages {
            for offset in 1..=gap {
                if base + offset <= compare_pages {
                    push(&mut tasks, &mut seen, base, base + offset, offset);
                }
                if base > offset {
                    let compare = base - offset;
                    if compare <= compare_pages {
                        push(&mut tasks, &mut seen, base, compare, offset);
                    }
                }
            }
        }

        // Random extras, only for small task lists and only when memory
        // is not already tight
        if tasks.len() < RANDOM_TOPUP_LIMIT
            && self.config.random_candidates > 0
            && !self.memory.under_pressure()
        {
            let lowest = gap + 1;
            for _ in 0..self.config.random_candidates {
                let base = fastrand::u32(1..=base_pages);
                let compare = fastrand::u32(1..=compare_pages);
                push(&mut tasks, &mut seen, base, compare, lowest);
            }
        }

        // Stable sort keeps insertion order within a priority class
        tasks.sort();

        info!(
            "Generated {} candidate pairs for {}x{} pages (gap {})",
            tasks.len(), base_pages, compare_pages, gap
        );
        tasks
    }
}
