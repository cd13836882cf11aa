//! Batch similarity scoring. Candidates are walked in priority order in
//! fixed-size batches; within a batch, tasks run concurrently behind a
//! semaphore. Every blocking point is timeout-bounded: image fetches,
//! single batches, and the overall match deadline. A batch that blows its
//! budget is abandoned with whatever scores completed; tasks still running
//! at that point finish in the background unobserved. Transient render
//! failures are retried with exponential backoff, then the pair is
//! dropped from the results rather than failing the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::{ImageCache, ScoreCache};
use crate::config::subsystems::{MatcherConfig, ProcessorConfig, SimilarityConfig, SimilarityMetric};
use crate::error::{Error, Result};
use crate::matcher::types::{CandidateTask, ScoringOutcome};
use crate::similarity;
use crate::similarity::raster;
use crate::types::{Document, RasterImage, SimilarityKey};

pub struct BatchScorer {
    matcher: MatcherConfig,
    similarity: SimilarityConfig,
    processor: ProcessorConfig,
    images: Arc<ImageCache>,
    scores: Arc<ScoreCache>,
}

impl BatchScorer {
    pub fn new(
        matcher: MatcherConfig,
        similarity: SimilarityConfig,
        processor: ProcessorConfig,
        images: Arc<ImageCache>,
        scores: Arc<ScoreCache>,
    ) -> Self {
        Self { matcher, similarity, processor, images, scores }
    }

    /// Metric actually used for scoring: the fast profile always takes the
    /// histogram shortcut, everything else follows the similarity config.
    fn effective_metric(&self) -> SimilarityMetric {
        if self.matcher.profile.is_fast() {
            SimilarityMetric::Histogram
        } else {
            self.similarity.metric
        }
    }

    /// Scores the candidate list against the given deadline. Completed
    /// scores are written to the shared score cache as they arrive; the
    /// outcome lists them along with how the phase ended.
    pub fn score_candidates<F>(
        &self,
        handle: &tokio::runtime::Handle,
        base: &Document,
        compare: &Document,
        tasks: &[CandidateTask],
        deadline: Instant,
        mut progress: F,
    ) -> ScoringOutcome
    where
        F: FnMut(usize, usize),
    {
        let mut outcome = ScoringOutcome::default();
        if tasks.is_empty() {
            return outcome;
        }

        let total = tasks.len();
        let metric = self.effective_metric();
        let semaphore = Arc::new(Semaphore::new(self.processor.max_concurrent_comparisons));
        let batch_timeout = Duration::from_millis(self.processor.batch_timeout_ms);

        let min_pages = base.page_count().min(compare.page_count());
        let early_target = if self.matcher.early_stopping_enabled && min_pages > 0 {
            (self.matcher.early_stopping_threshold * min_pages as f64).ceil() as usize
        } else {
            usize::MAX
        };

        info!(
            "Scoring {} candidate pairs with {} metric in batches of {}",
            total, metric.as_str(), self.processor.batch_size
        );

        let mut matched_pages = 0usize;
        let mut processed = 0usize;

        for batch in tasks.chunks(self.processor.batch_size) {
            let now = Instant::now();
            if now >= deadline {
                warn!("Match deadline expired before batch, keeping {} scores", outcome.scored.len());
                outcome.deadline_expired = true;
                break;
            }

            let budget = batch_timeout.min(deadline - now);
            let (scored, failed, timed_out) =
                handle.block_on(self.run_batch(base, compare, batch, Arc::clone(&semaphore), budget, metric));

            processed += batch.len();
            outcome.failed += failed;

            for (task, score) in scored {
                let key = SimilarityKey::new(&base.id, task.base_page, &compare.id, task.compare_page);
                self.scores.insert(key, score);
                if score >= self.matcher.visual_similarity_threshold {
                    matched_pages += 1;
                }
                outcome.scored.push((task, score));
            }

            progress(processed, total);

            if timed_out {
                debug!("Batch abandoned at {:?} budget", budget);
            }

            if matched_pages >= early_target {
                info!(
                    "Early stopping: {} matched pages reached target {} with {} candidates left",
                    matched_pages, early_target, total - processed
                );
                outcome.stopped_early = true;
                break;
            }
        }

        info!(
            "Scoring finished: {} scored, {} failed, early_stop={}, deadline_expired={}",
            outcome.scored.len(), outcome.failed, outcome.stopped_early, outcome.deadline_expired
        );
        outcome
    }

    /// Runs one batch under its budget. Returns completed scores, the
    /// failed-pair count, and whether the budget expired.
    async fn run_batch(
        &self,
        base: &Document,
        compare: &Document,
        batch: &[CandidateTask],
        semaphore: Arc<Semaphore>,
        budget: Duration,
        metric: SimilarityMetric,
    ) -> (Vec<(CandidateTask, f64)>, usize, bool) {
        let mut join_set: JoinSet<(CandidateTask, Result<f64>)> = JoinSet::new();

        for &task in batch {
            let semaphore = Arc::clone(&semaphore);
            let images = Arc::clone(&self.images);
            let base = base.clone();
            let compare = compare.clone();
            let similarity_cfg = self.similarity.clone();
            let fast = self.matcher.profile.is_fast();
            let retry_count = self.processor.retry_count;
            let retry_delay = self.processor.retry_delay_ms;
            let fetch_timeout = Duration::from_millis(self.processor.image_fetch_timeout_ms);

            join_set.spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (task, Err(Error::async_err("Scoring semaphore closed"))),
                };

                let mut attempt = 0usize;
                let result = loop {
                    let outcome = score_pair(
                        Arc::clone(&images), &base, &compare, task, metric,
                        similarity_cfg.clone(), fast, fetch_timeout,
                    ).await;

                    match outcome {
                        Ok(score) => break Ok(score),
                        Err(e) if e.is_transient() && attempt < retry_count => {
                            let delay = retry_delay.saturating_mul(1 << attempt);
                            debug!(
                                "Transient failure scoring ({}, {}), retry {} in {}ms: {}",
                                task.base_page, task.compare_page, attempt + 1, delay, e
                            );
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            attempt += 1;
                        }
                        Err(e) => break Err(e),
                    }
                };

                drop(permit);
                (task, result)
            });
        }

        let mut scored = Vec::with_capacity(batch.len());
        let mut failed = 0usize;
        let deadline = tokio::time::Instant::now() + budget;

        // Each completed task is banked before the next timeout check, so
        // an expired budget abandons only the pairs still in flight.
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((task, Ok(score))))) => scored.push((task, score)),
                Ok(Some(Ok((task, Err(e))))) => {
                    warn!(
                        "Dropping pair ({}, {}) after exhausted retries: {}",
                        task.base_page, task.compare_page, e
                    );
                    failed += 1;
                }
                Ok(Some(Err(e))) => {
                    warn!("Scoring task join failed: {}", e);
                    failed += 1;
                }
                Ok(None) => return (scored, failed, false),
                Err(_) => {
                    let abandoned = join_set.len();
                    warn!(
                        "Batch budget {:?} expired, abandoning {} of {} pairs ({} scored)",
                        budget, abandoned, batch.len(), scored.len()
                    );
                    // Dropping the set detaches the stragglers; blocking
                    // work already running finishes unobserved.
                    failed += abandoned;
                    return (scored, failed, true);
                }
            }
        }
    }
}

/// Scores one pair: fetch both images from the cache (each fetch bounded
/// by the fetch timeout), optionally downsample, then run the metric.
async fn score_pair(
    images: Arc<ImageCache>,
    base: &Document,
    compare: &Document,
    task: CandidateTask,
    metric: SimilarityMetric,
    config: SimilarityConfig,
    downsample: bool,
    fetch_timeout: Duration,
) -> Result<f64> {
    let base_image = fetch_image(Arc::clone(&images), base.clone(), task.base_page, fetch_timeout).await?;
    let compare_image = fetch_image(images, compare.clone(), task.compare_page, fetch_timeout).await?;

    let config_clone = config.clone();
    tokio::task::spawn_blocking(move || {
        if downsample {
            let small_base = raster::downsample_to_fit(&base_image, config_clone.downsample_max_dim);
            let small_compare = raster::downsample_to_fit(&compare_image, config_clone.downsample_max_dim);
            similarity::score(metric, &small_base, &small_compare, &config_clone)
        } else {
            similarity::score(metric, &base_image, &compare_image, &config_clone)
        }
    })
    .await?
}

async fn fetch_image(
    images: Arc<ImageCache>,
    document: Document,
    page: u32,
    fetch_timeout: Duration,
) -> Result<Arc<RasterImage>> {
    let handle = tokio::task::spawn_blocking(move || images.get(&document, page));
    match tokio::time::timeout(fetch_timeout, handle).await {
        Ok(joined) => joined?,
        Err(_) => Err(Error::render_timeout(format!(
            "Image fetch for page {} exceeded {:?}", page, fetch_timeout
        ))),
    }
}
