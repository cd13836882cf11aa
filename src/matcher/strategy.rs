//! Document matching facade. Small enough documents get the full visual
//! pipeline: candidate generation, batch scoring, assignment solving.
//! Documents over the large-document threshold skip straight to index-
//! aligned simple matching, and any visual-pipeline failure or timeout
//! falls back to the same simple path instead of surfacing an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cache::{ImageCache, ScoreCache};
use crate::config::PagematchConfig;
use crate::error::{Error, Result};
use crate::matcher::assignment::AssignmentSolver;
use crate::matcher::candidates::CandidateGenerator;
use crate::matcher::scorer::BatchScorer;
use crate::matcher::types::CostMatrix;
use crate::render::{NoopProgress, PageRenderer, ProgressReporter};
use crate::types::{Document, MatchReport, MatchStrategyKind, PagePair, SimilarityKey};
use crate::utils::MemoryMonitor;

const MEMORY_CHECK_INTERVAL_MS: u64 = 1_000;

pub struct DocumentMatcher {
    config: PagematchConfig,
    images: Arc<ImageCache>,
    scores: Arc<ScoreCache>,
    scorer: BatchScorer,
    memory: MemoryMonitor,
    progress: Arc<dyn ProgressReporter>,
    runtime: Arc<tokio::runtime::Runtime>,
    invocations: AtomicUsize,
}

impl DocumentMatcher {
    pub fn new(config: PagematchConfig, renderer: Arc<dyn PageRenderer>) -> Result<Self> {
        let runtime = Arc::new(build_runtime(&config)?);
        Self::with_runtime(config, renderer, Arc::new(NoopProgress), runtime)
    }

    pub fn with_progress(
        config: PagematchConfig,
        renderer: Arc<dyn PageRenderer>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        let runtime = Arc::new(build_runtime(&config)?);
        Self::with_runtime(config, renderer, progress, runtime)
    }

    pub fn with_runtime(
        config: PagematchConfig,
        renderer: Arc<dyn PageRenderer>,
        progress: Arc<dyn ProgressReporter>,
        runtime: Arc<tokio::runtime::Runtime>,
    ) -> Result<Self> {
        config.validate()?;

        let images = Arc::new(ImageCache::new(
            renderer,
            config.cache.image_cache_capacity,
            Duration::from_millis(config.cache.render_timeout_ms),
        ));
        let scores = Arc::new(ScoreCache::with_capacity(config.cache.score_cache_capacity));
        let scorer = BatchScorer::new(
            config.matcher.clone(),
            config.similarity.clone(),
            config.processor.clone(),
            Arc::clone(&images),
            Arc::clone(&scores),
        );
        let memory = MemoryMonitor::new(
            config.processor.memory_warn_threshold_mb,
            config.processor.memory_critical_threshold_mb,
            MEMORY_CHECK_INTERVAL_MS,
        );

        Ok(Self {
            config,
            images,
            scores,
            scorer,
            memory,
            progress,
            runtime,
            invocations: AtomicUsize::new(0),
        })
    }

    /// Matches the pages of two documents. Never fails: degraded paths
    /// produce an index-aligned pairing with an assumed confidence.
    pub fn match_documents(&self, base: &Document, compare: &Document) -> MatchReport {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let comparison_id = format!("{}:{}", base.id, compare.id);
        let total_pages = base.page_count() + compare.page_count();

        if total_pages > self.config.matcher.large_document_threshold {
            info!(
                "{} combined pages exceed large-document threshold {}, using simple match",
                total_pages, self.config.matcher.large_document_threshold
            );
            return self.simple_match(base, compare, MatchStrategyKind::Simple);
        }

        match self.visual_match(base, compare, &comparison_id) {
            Ok(report) => report,
            Err(e) => {
                warn!("Visual matching failed ({}), falling back to simple match", e);
                self.simple_match(base, compare, MatchStrategyKind::Fallback)
            }
        }
    }

    /// Times the matcher has been invoked. Lets callers verify result
    /// caching short-circuits repeat comparisons.
    pub fn match_invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.images
    }

    pub fn clear_caches(&self) {
        self.images.clear();
        self.scores.clear();
    }

    fn visual_match(&self, base: &Document, compare: &Document, comparison_id: &str) -> Result<MatchReport> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.matcher.match_timeout_secs);

        if self.memory.should_check() {
            if let Some(pressure) = self.memory.check_memory() {
                warn!(
                    "Memory pressure {:?} at {} MB, optional matching work will be skipped",
                    pressure, self.memory.get_memory_usage_mb()
                );
            }
        }

        self.report(comparison_id, 0, 1, "candidates");
        let generator = CandidateGenerator::new(&self.config.matcher, &self.memory);
        let tasks = generator.generate(
            &base.id,
            base.page_count() as u32,
            &compare.id,
            compare.page_count() as u32,
            &self.scores,
        );

        let outcome = self.scorer.score_candidates(
            self.runtime.handle(),
            base,
            compare,
            &tasks,
            deadline,
            |done, total| self.progress.report_progress(comparison_id, done, total, "scoring"),
        );

        if outcome.deadline_expired && outcome.scored.is_empty() && self.scores.is_empty() {
            return Err(Error::MatchTimeout(format!(
                "No pair scored within {}s", self.config.matcher.match_timeout_secs
            )));
        }

        self.report(comparison_id, 0, 1, "assignment");
        let matrix = self.build_cost_matrix(base, compare);
        let assignment = AssignmentSolver::new(&self.config.matcher).solve(&matrix);

        let report = self.build_report(base, compare, &matrix, &assignment);
        self.report(comparison_id, 1, 1, "done");
        info!(
            "Visual match of {} vs {} finished in {:?}: {} pairs, confidence {:.3}",
            base.id, compare.id, started.elapsed(), report.pairs.len(), report.confidence
        );
        Ok(report)
    }

    /// Dense cost matrix from the score cache: 1 - similarity for pairs at
    /// or above the match threshold, maximum cost everywhere else.
    fn build_cost_matrix(&self, base: &Document, compare: &Document) -> CostMatrix {
        let rows = base.page_count();
        let cols = compare.page_count();
        let threshold = self.config.matcher.visual_similarity_threshold;
        let mut matrix = CostMatrix::filled(rows, cols, 1.0);

        for row in 0..rows {
            for col in 0..cols {
                let key = SimilarityKey::new(&base.id, row as u32 + 1, &compare.id, col as u32 + 1);
                if let Some(score) = self.scores.get(&key) {
                    if score >= threshold {
                        matrix.set(row, col, 1.0 - score);
                    }
                }
            }
        }
        matrix
    }

    fn build_report(
        &self,
        base: &Document,
        compare: &Document,
        matrix: &CostMatrix,
        assignment: &[Option<usize>],
    ) -> MatchReport {
        let mut pairs = Vec::with_capacity(base.page_count().max(compare.page_count()));
        let mut compare_taken = vec![false; compare.page_count()];

        for (row, slot) in assignment.iter().enumerate() {
            let base_page = row as u32 + 1;
            match slot {
                Some(col) => {
                    let similarity = 1.0 - matrix.get(row, *col);
                    compare_taken[*col] = true;
                    pairs.push(PagePair::matched(&base.id, &compare.id, base_page, *col as u32 + 1, similarity));
                }
                None => pairs.push(PagePair::base_only(&base.id, &compare.id, base_page)),
            }
        }

        for (col, taken) in compare_taken.iter().enumerate() {
            if !taken {
                pairs.push(PagePair::compare_only(&base.id, &compare.id, col as u32 + 1));
            }
        }

        let matched: Vec<&PagePair> = pairs.iter().filter(|p| p.matched).collect();
        let confidence = if base.page_count() == 0 || matched.is_empty() {
            0.0
        } else {
            let fraction = matched.len() as f64 / base.page_count() as f64;
            let mean_similarity: f64 =
                matched.iter().map(|p| p.similarity).sum::<f64>() / matched.len() as f64;
            (fraction * mean_similarity).clamp(0.0, 1.0)
        };

        MatchReport {
            pairs,
            confidence,
            strategy: MatchStrategyKind::Visual,
        }
    }

    /// Index-aligned pairing with an assumed confidence. No rendering, no
    /// scoring; correctness is traded for bounded time on huge documents
    /// and on fallback.
    fn simple_match(&self, base: &Document, compare: &Document, strategy: MatchStrategyKind) -> MatchReport {
        let confidence = self.config.matcher.simple_match_confidence;
        let base_count = base.page_count() as u32;
        let compare_count = compare.page_count() as u32;
        let overlap = base_count.min(compare_count);

        let mut pairs = Vec::with_capacity(base_count.max(compare_count) as usize);
        for page in 1..=overlap {
            pairs.push(PagePair::matched(&base.id, &compare.id, page, page, confidence));
        }
        for page in overlap + 1..=base_count {
            pairs.push(PagePair::base_only(&base.id, &compare.id, page));
        }
        for page in overlap + 1..=compare_count {
            pairs.push(PagePair::compare_only(&base.id, &compare.id, page));
        }

        debug!(
            "Simple match ({}): {} pairs at assumed confidence {:.2}",
            strategy.as_str(), pairs.len(), confidence
        );
        MatchReport { pairs, confidence, strategy }
    }

    fn report(&self, comparison_id: &str, completed: usize, total: usize, phase: &str) {
        // Fire and forget; the sink is trusted not to block
        self.progress.report_progress(comparison_id, completed, total, phase);
    }
}

fn build_runtime(config: &PagematchConfig) -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.processor.worker_threads())
        .thread_name("pagematch-worker")
        .enable_time()
        .build()?;
    Ok(runtime)
}
