//! Top-level comparison orchestrator. Checks the result cache, runs the
//! page matcher, then walks matched pairs through the content comparators
//! under the same batching discipline the scorer uses. The result is
//! immutable and cached; repeat comparisons of the same document pair are
//! served without re-matching.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::ResultCache;
use crate::compare::content::ContentComparators;
use crate::config::PagematchConfig;
use crate::error::{Error, Result};
use crate::matcher::DocumentMatcher;
use crate::render::{ImageExtractor, NoopProgress, PageRenderer, ProgressReporter, TextExtractor};
use crate::types::{
    ComparisonResult, Difference, DifferenceKind, Document, PagePair, Severity, Summary,
};

pub struct DocumentComparer {
    config: PagematchConfig,
    matcher: DocumentMatcher,
    comparators: ContentComparators,
    results: ResultCache,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl DocumentComparer {
    pub fn new(config: PagematchConfig, renderer: Arc<dyn PageRenderer>) -> Result<Self> {
        Self::with_collaborators(config, renderer, None, None, Arc::new(NoopProgress))
    }

    pub fn with_collaborators(
        config: PagematchConfig,
        renderer: Arc<dyn PageRenderer>,
        text: Option<Arc<dyn TextExtractor>>,
        images: Option<Arc<dyn ImageExtractor>>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.processor.worker_threads())
                .thread_name("pagematch-worker")
                .enable_time()
                .build()?,
        );
        let matcher = DocumentMatcher::with_runtime(
            config.clone(),
            renderer,
            progress,
            Arc::clone(&runtime),
        )?;
        let results = ResultCache::new(
            config.cache.result_cache_capacity,
            Duration::from_secs(config.cache.result_cache_ttl_secs),
        );

        Ok(Self {
            config,
            matcher,
            comparators: ContentComparators::new(text, images),
            results,
            runtime,
        })
    }

    /// Compares two documents end to end. An explicit id is used verbatim;
    /// otherwise one is derived from the document ids and the current time.
    /// Per-pair failures degrade the result; only failures that prevent
    /// building any result at all come back as errors.
    pub fn compare(
        &self,
        base: &Document,
        compare: &Document,
        id: Option<&str>,
    ) -> Result<Arc<ComparisonResult>> {
        if let Some(cached) = self.results.get(&base.id, &compare.id) {
            info!("Result cache hit for {} vs {}", base.id, compare.id);
            return Ok(cached);
        }

        let result = self
            .compare_inner(base, compare, id)
            .map_err(Error::comparison_failed)?;

        let result = Arc::new(result);
        self.results.insert(Arc::clone(&result));
        Ok(result)
    }

    pub fn clear_cache(&self) {
        self.results.clear();
        self.matcher.clear_caches();
    }

    /// Matcher invocations so far. Exposed for cache verification.
    pub fn match_invocations(&self) -> usize {
        self.matcher.match_invocations()
    }

    fn compare_inner(
        &self,
        base: &Document,
        compare: &Document,
        id: Option<&str>,
    ) -> Result<ComparisonResult> {
        let created_at = chrono::Utc::now();
        let id = id.map(str::to_string).unwrap_or_else(|| {
            format!("{}-vs-{}-{}", base.id, compare.id, created_at.timestamp_millis())
        });

        info!("Comparing {} ({} pages) vs {} ({} pages)",
            base.id, base.page_count(), compare.id, compare.page_count());

        let report = self.matcher.match_documents(base, compare);
        let mut pairs = report.pairs.clone();

        self.run_content_phase(base, compare, &mut pairs);

        let mut summary = summarize(base, compare, &pairs);

        if summary.difference_count == 0
            && summary.overall_similarity < self.config.matcher.visual_similarity_threshold
            && self.config.processor.synthesize_placeholder_difference
        {
            if let Some(pair) = lowest_similarity_matched(&mut pairs) {
                debug!("Synthesizing placeholder visual difference");
                pair.differences.push(placeholder_difference(summary.overall_similarity));
                summary.difference_count = 1;
            }
        }

        info!(
            "Comparison {} finished: {} matched / {} pairs, {} differences, strategy {}",
            id, summary.matched_pages, pairs.len(), summary.difference_count,
            report.strategy.as_str()
        );

        Ok(ComparisonResult {
            id,
            base_doc: base.id.clone(),
            compare_doc: compare.id.clone(),
            confidence: report.confidence,
            strategy: report.strategy,
            page_pairs: pairs,
            summary,
            created_at: created_at.to_rfc3339(),
        })
    }

    /// Runs the content comparators over every matched pair, bounded by the
    /// scoring concurrency limit and the per-pair content timeout. A pair
    /// whose comparison fails or times out keeps an empty difference list.
    fn run_content_phase(&self, base: &Document, compare: &Document, pairs: &mut [PagePair]) {
        if self.comparators.is_empty() {
            return;
        }

        let targets: Vec<(usize, u32, u32)> = pairs
            .iter()
            .enumerate()
            .filter_map(|(idx, pair)| match (pair.matched, pair.base_page, pair.compare_page) {
                (true, Some(b), Some(c)) => Some((idx, b, c)),
                _ => None,
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        debug!("Content phase over {} matched pairs", targets.len());
        let semaphore = Arc::new(Semaphore::new(self.config.processor.max_concurrent_comparisons));
        let timeout = Duration::from_millis(self.config.processor.content_timeout_ms);

        // Same discipline as scoring: fixed-size sequential batches, each
        // pair concurrent behind the semaphore with its own timeout
        let outcomes: Vec<(usize, Vec<Difference>)> = self.runtime.block_on(async {
            let mut outcomes = Vec::new();

            for batch in targets.chunks(self.config.processor.batch_size) {
                let mut join_set: JoinSet<(usize, u32, u32, Result<Vec<Difference>>)> = JoinSet::new();

                for &(idx, base_page, compare_page) in batch {
                    let semaphore = Arc::clone(&semaphore);
                    let comparators = self.comparators.clone();
                    let base = base.clone();
                    let compare = compare.clone();

                    join_set.spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => {
                                return (idx, base_page, compare_page,
                                    Err(Error::async_err("Content semaphore closed")));
                            }
                        };

                        let work = tokio::task::spawn_blocking(move || {
                            comparators.compare_pair(&base, &compare, base_page, compare_page)
                        });
                        let result = match tokio::time::timeout(timeout, work).await {
                            Ok(Ok(result)) => result,
                            Ok(Err(join_err)) => Err(Error::ThreadJoin(join_err)),
                            Err(_) => Err(Error::BatchTimeout(format!(
                                "Content comparison exceeded {:?}", timeout
                            ))),
                        };
                        (idx, base_page, compare_page, result)
                    });
                }

                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok((idx, _, _, Ok(differences))) => outcomes.push((idx, differences)),
                        Ok((_, base_page, compare_page, Err(e))) => {
                            warn!("Content comparison of pages ({}, {}) skipped: {}",
                                base_page, compare_page, e);
                        }
                        Err(e) => warn!("Content comparison task lost: {}", e),
                    }
                }
            }
            outcomes
        });

        for (idx, differences) in outcomes {
            pairs[idx].differences = differences;
        }
    }
}

fn summarize(base: &Document, compare: &Document, pairs: &[PagePair]) -> Summary {
    let matched_pages = pairs.iter().filter(|p| p.matched).count();
    let difference_count = pairs.iter().map(|p| p.differences.len()).sum();
    // Unmatched pairs drag the overall score down as zeros
    let overall_similarity = if pairs.is_empty() {
        0.0
    } else {
        pairs.iter().map(|p| p.similarity).sum::<f64>() / pairs.len() as f64
    };

    Summary {
        base_page_count: base.page_count(),
        compare_page_count: compare.page_count(),
        matched_pages,
        overall_similarity,
        difference_count,
    }
}

fn lowest_similarity_matched(pairs: &mut [PagePair]) -> Option<&mut PagePair> {
    pairs
        .iter_mut()
        .filter(|p| p.matched)
        .min_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal))
}

fn placeholder_difference(overall_similarity: f64) -> Difference {
    Difference {
        kind: DifferenceKind::Visual,
        severity: Severity::Moderate,
        description: format!(
            "Pages differ visually (overall similarity {:.2}) but no specific difference was extracted",
            overall_similarity
        ),
        region: None,
        before: None,
        after: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorSpace, DocumentId, Page, RasterImage};
    use ahash::AHashMap;

    struct NoiseRenderer {
        content: AHashMap<(String, u32), u64>,
    }

    impl NoiseRenderer {
        fn new(layout: &[(&str, &[u64])]) -> Self {
            let mut content = AHashMap::new();
            for (doc, seeds) in layout {
                for (i, seed) in seeds.iter().enumerate() {
                    content.insert((doc.to_string(), i as u32 + 1), *seed);
                }
            }
            Self { content }
        }
    }

    impl PageRenderer for NoiseRenderer {
        fn render_page(&self, document: &Document, page_number: u32, _dpi: Option<u32>) -> Result<RasterImage> {
            let seed = self.content
                .get(&(document.id.as_str().to_string(), page_number))
                .copied()
                .unwrap_or(page_number as u64);
            let rng = fastrand::Rng::with_seed(seed);
            let data: Vec<u8> = (0..32 * 32).map(|_| rng.u8(..)).collect();
            RasterImage::new(32, 32, ColorSpace::Gray, data)
        }
    }

    struct MapText {
        pages: AHashMap<(String, u32), String>,
    }

    impl TextExtractor for MapText {
        fn extract_text(&self, document: &Document, page_number: u32) -> Result<String> {
            Ok(self.pages
                .get(&(document.id.as_str().to_string(), page_number))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn doc(id: &str, pages: u32) -> Document {
        Document {
            id: DocumentId::from(id),
            pages: (1..=pages).map(|n| Page { number: n, width: 32, height: 32 }).collect(),
        }
    }

    #[test]
    fn identical_documents_summarize_cleanly() {
        let renderer = NoiseRenderer::new(&[("base", &[1, 2]), ("cmp", &[1, 2])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();
        let result = comparer.compare(&doc("base", 2), &doc("cmp", 2), None).unwrap();

        assert_eq!(result.summary.matched_pages, 2);
        assert_eq!(result.summary.base_page_count, 2);
        assert_eq!(result.summary.difference_count, 0);
        assert!(result.summary.overall_similarity > 0.9);
    }

    #[test]
    fn repeat_comparison_is_served_from_cache() {
        let renderer = NoiseRenderer::new(&[("base", &[1]), ("cmp", &[1])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();

        let first = comparer.compare(&doc("base", 1), &doc("cmp", 1), None).unwrap();
        let second = comparer.compare(&doc("base", 1), &doc("cmp", 1), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(comparer.match_invocations(), 1);
    }

    #[test]
    fn clear_cache_forces_rematch() {
        let renderer = NoiseRenderer::new(&[("base", &[1]), ("cmp", &[1])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();

        comparer.compare(&doc("base", 1), &doc("cmp", 1), None).unwrap();
        comparer.clear_cache();
        comparer.compare(&doc("base", 1), &doc("cmp", 1), None).unwrap();
        assert_eq!(comparer.match_invocations(), 2);
    }

    #[test]
    fn explicit_id_is_used_verbatim() {
        let renderer = NoiseRenderer::new(&[("base", &[1]), ("cmp", &[1])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();
        let result = comparer.compare(&doc("base", 1), &doc("cmp", 1), Some("run-42")).unwrap();
        assert_eq!(result.id, "run-42");
    }

    #[test]
    fn text_differences_land_on_matched_pairs() {
        let renderer = NoiseRenderer::new(&[("base", &[1]), ("cmp", &[1])]);
        let mut pages = AHashMap::new();
        pages.insert(("base".to_string(), 1), "alpha\nbeta".to_string());
        pages.insert(("cmp".to_string(), 1), "alpha\ngamma".to_string());

        let comparer = DocumentComparer::with_collaborators(
            PagematchConfig::default(),
            Arc::new(renderer),
            Some(Arc::new(MapText { pages })),
            None,
            Arc::new(NoopProgress),
        )
        .unwrap();

        let result = comparer.compare(&doc("base", 1), &doc("cmp", 1), None).unwrap();
        assert_eq!(result.summary.difference_count, 1);
        let pair = result.page_pairs.iter().find(|p| p.matched).unwrap();
        assert_eq!(pair.differences.len(), 1);
        assert_eq!(pair.differences[0].kind, DifferenceKind::Text);
    }

    #[test]
    fn content_phase_covers_every_batch() {
        // More matched pairs than one batch: each page pair carries its
        // own text change and all of them must be diffed
        let seeds: Vec<u64> = (1..=5).collect();
        let renderer = NoiseRenderer::new(&[("base", &seeds[..]), ("cmp", &seeds[..])]);

        let mut pages = AHashMap::new();
        for page in 1..=5u32 {
            pages.insert(("base".to_string(), page), format!("line {}", page));
            pages.insert(("cmp".to_string(), page), format!("edited {}", page));
        }

        let mut config = PagematchConfig::default();
        config.processor.batch_size = 2;
        let comparer = DocumentComparer::with_collaborators(
            config,
            Arc::new(renderer),
            Some(Arc::new(MapText { pages })),
            None,
            Arc::new(NoopProgress),
        )
        .unwrap();

        let result = comparer.compare(&doc("base", 5), &doc("cmp", 5), None).unwrap();
        assert_eq!(result.summary.matched_pages, 5);
        assert_eq!(result.summary.difference_count, 5);
        for pair in result.page_pairs.iter().filter(|p| p.matched) {
            assert_eq!(pair.differences.len(), 1);
        }
    }

    #[test]
    fn placeholder_difference_is_synthesized_when_enabled() {
        // Two matched pages plus one that matches nothing: overall
        // similarity drops below the match threshold with zero extracted
        // differences
        let renderer = NoiseRenderer::new(&[("base", &[1, 2, 99]), ("cmp", &[1, 2])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();
        let result = comparer.compare(&doc("base", 3), &doc("cmp", 2), None).unwrap();

        assert_eq!(result.summary.difference_count, 1);
        let placeholder: Vec<_> = result
            .page_pairs
            .iter()
            .flat_map(|p| p.differences.iter())
            .collect();
        assert_eq!(placeholder.len(), 1);
        assert_eq!(placeholder[0].kind, DifferenceKind::Visual);
    }

    #[test]
    fn placeholder_difference_can_be_disabled() {
        let renderer = NoiseRenderer::new(&[("base", &[1, 2, 99]), ("cmp", &[1, 2])]);
        let mut config = PagematchConfig::default();
        config.processor.synthesize_placeholder_difference = false;
        let comparer = DocumentComparer::new(config, Arc::new(renderer)).unwrap();
        let result = comparer.compare(&doc("base", 3), &doc("cmp", 2), None).unwrap();

        assert_eq!(result.summary.difference_count, 0);
        assert!(result.page_pairs.iter().all(|p| p.differences.is_empty()));
    }

    #[test]
    fn unmatched_pages_lower_overall_similarity() {
        // Base has an extra page nothing in compare resembles
        let renderer = NoiseRenderer::new(&[("base", &[1, 2, 99]), ("cmp", &[1, 2])]);
        let comparer = DocumentComparer::new(PagematchConfig::default(), Arc::new(renderer)).unwrap();
        let result = comparer.compare(&doc("base", 3), &doc("cmp", 2), None).unwrap();

        assert_eq!(result.summary.matched_pages, 2);
        assert!(result.summary.overall_similarity < 0.9);
        assert!(result.page_pairs.iter().any(|p| !p.matched));
    }
}
