//! Content comparators for matched page pairs. Text is diffed line by
//! line over a longest-common-subsequence alignment; embedded images are
//! compared by count, name, and dimensions. Extractors are optional: a
//! missing extractor just skips that comparator.

use std::sync::Arc;

use log::{debug, trace};

use crate::error::Result;
use crate::render::{ImageExtractor, ImageRef, TextExtractor};
use crate::types::{Difference, DifferenceKind, Document, Severity};

/// Changed-line fractions at which a text difference escalates.
const MODERATE_CHANGE_FRACTION: f64 = 0.1;
const MAJOR_CHANGE_FRACTION: f64 = 0.4;

#[derive(Clone)]
pub struct ContentComparators {
    text: Option<Arc<dyn TextExtractor>>,
    images: Option<Arc<dyn ImageExtractor>>,
}

impl ContentComparators {
    pub fn new(text: Option<Arc<dyn TextExtractor>>, images: Option<Arc<dyn ImageExtractor>>) -> Self {
        Self { text, images }
    }

    pub fn none() -> Self {
        Self { text: None, images: None }
    }

    /// True when no extractor is configured and the content phase can be
    /// skipped outright.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.images.is_none()
    }

    /// Runs every configured comparator for one matched page pair and
    /// returns the combined differences.
    pub fn compare_pair(
        &self,
        base: &Document,
        compare: &Document,
        base_page: u32,
        compare_page: u32,
    ) -> Result<Vec<Difference>> {
        let mut differences = Vec::new();

        if let Some(text) = &self.text {
            let before = text.extract_text(base, base_page)?;
            let after = text.extract_text(compare, compare_page)?;
            differences.extend(diff_text(&before, &after));
        }

        if let Some(images) = &self.images {
            let before = images.extract_images(base, base_page)?;
            let after = images.extract_images(compare, compare_page)?;
            differences.extend(diff_images(&before, &after));
        }

        trace!(
            "Content comparison of {} p{} vs {} p{}: {} differences",
            base.id, base_page, compare.id, compare_page, differences.len()
        );
        Ok(differences)
    }
}

/// Line-level text diff. Contiguous runs of changed lines become one
/// difference each, carrying the removed and added text.
fn diff_text(before: &str, after: &str) -> Vec<Difference> {
    if before == after {
        return Vec::new();
    }

    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();
    let common = longest_common_subsequence(&before_lines, &after_lines);

    let total = before_lines.len().max(after_lines.len()).max(1);
    let changed = (before_lines.len() - common.len()) + (after_lines.len() - common.len());
    let severity = severity_for_fraction(changed as f64 / total as f64);

    let mut differences = Vec::new();
    let mut b = 0usize;
    let mut a = 0usize;

    for &(cb, ca) in common.iter().chain(std::iter::once(&(before_lines.len(), after_lines.len()))) {
        let removed = &before_lines[b..cb];
        let added = &after_lines[a..ca];
        if !removed.is_empty() || !added.is_empty() {
            differences.push(Difference {
                kind: DifferenceKind::Text,
                severity,
                description: format!("{} line(s) removed, {} line(s) added", removed.len(), added.len()),
                region: None,
                before: non_empty(removed.join("\n")),
                after: non_empty(added.join("\n")),
            });
        }
        b = cb + 1;
        a = ca + 1;
        if b > before_lines.len() || a > after_lines.len() {
            break;
        }
    }

    debug!("Text diff produced {} hunk(s), severity {:?}", differences.len(), severity);
    differences
}

/// Pairs of (before index, after index) for the longest common line
/// subsequence, in order.
fn longest_common_subsequence(before: &[&str], after: &[&str]) -> Vec<(usize, usize)> {
    let n = before.len();
    let m = after.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let mut table = vec![0usize; (n + 1) * (m + 1)];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * (m + 1) + j] = if before[i] == after[j] {
                table[(i + 1) * (m + 1) + j + 1] + 1
            } else {
                table[(i + 1) * (m + 1) + j].max(table[i * (m + 1) + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0]);
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if before[i] == after[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * (m + 1) + j] >= table[i * (m + 1) + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

fn diff_images(before: &[ImageRef], after: &[ImageRef]) -> Vec<Difference> {
    let mut differences = Vec::new();

    if before.len() != after.len() {
        differences.push(Difference {
            kind: DifferenceKind::Image,
            severity: Severity::Moderate,
            description: format!("Image count changed from {} to {}", before.len(), after.len()),
            region: None,
            before: Some(before.len().to_string()),
            after: Some(after.len().to_string()),
        });
    }

    for (old, new) in before.iter().zip(after.iter()) {
        if old == new {
            continue;
        }
        let what = if old.name != new.name { "replaced" } else { "resized" };
        differences.push(Difference {
            kind: DifferenceKind::Image,
            severity: Severity::Minor,
            description: format!("Image '{}' {}", old.name, what),
            region: None,
            before: Some(format!("{} {}x{}", old.name, old.width, old.height)),
            after: Some(format!("{} {}x{}", new.name, new.width, new.height)),
        });
    }

    differences
}

fn severity_for_fraction(fraction: f64) -> Severity {
    if fraction >= MAJOR_CHANGE_FRACTION {
        Severity::Major
    } else if fraction >= MODERATE_CHANGE_FRACTION {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentId, Page};
    use ahash::AHashMap;

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

    struct FixedImages {
        refs: Vec<ImageRef>,
    }

    impl ImageExtractor for FixedImages {
        fn extract_images(&self, _document: &Document, _page_number: u32) -> Result<Vec<ImageRef>> {
            Ok(self.refs.clone())
        }
    }

    fn doc(id: &str) -> Document {
        Document {
            id: DocumentId::from(id),
            pages: vec![Page { number: 1, width: 100, height: 100 }],
        }
    }

    #[test]
    fn identical_text_yields_no_differences() {
        let diffs = diff_text("alpha\nbeta\ngamma", "alpha\nbeta\ngamma");
        assert!(diffs.is_empty());
    }

    #[test]
    fn changed_line_becomes_one_hunk() {
        let diffs = diff_text("alpha\nbeta\ngamma", "alpha\nBETA\ngamma");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DifferenceKind::Text);
        assert_eq!(diffs[0].before.as_deref(), Some("beta"));
        assert_eq!(diffs[0].after.as_deref(), Some("BETA"));
    }

    #[test]
    fn inserted_lines_have_no_before_text() {
        let diffs = diff_text("alpha\ngamma", "alpha\nbeta\ngamma");
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].before.is_none());
        assert_eq!(diffs[0].after.as_deref(), Some("beta"));
    }

    #[test]
    fn heavy_rewrite_is_major() {
        let diffs = diff_text("a\nb\nc\nd", "w\nx\ny\nz");
        assert!(!diffs.is_empty());
        assert_eq!(diffs[0].severity, Severity::Major);
    }

    #[test]
    fn small_change_in_long_text_is_minor() {
        let before: Vec<String> = (0..40).map(|i| format!("line {}", i)).collect();
        let mut after = before.clone();
        after[20] = "edited".to_string();
        let diffs = diff_text(&before.join("\n"), &after.join("\n"));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].severity, Severity::Minor);
    }

    #[test]
    fn image_count_change_is_reported() {
        let before = vec![ImageRef { name: "fig1".into(), width: 100, height: 80 }];
        let diffs = diff_images(&before, &[]);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DifferenceKind::Image);
        assert_eq!(diffs[0].severity, Severity::Moderate);
    }

    #[test]
    fn resized_image_is_minor() {
        let before = vec![ImageRef { name: "fig1".into(), width: 100, height: 80 }];
        let after = vec![ImageRef { name: "fig1".into(), width: 200, height: 160 }];
        let diffs = diff_images(&before, &after);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].severity, Severity::Minor);
        assert!(diffs[0].description.contains("resized"));
    }

    #[test]
    fn comparators_combine_text_and_images() {
        let mut pages = AHashMap::new();
        pages.insert(("base".to_string(), 1), "hello".to_string());
        pages.insert(("cmp".to_string(), 1), "goodbye".to_string());

        let comparators = ContentComparators::new(
            Some(Arc::new(MapText { pages })),
            Some(Arc::new(FixedImages { refs: Vec::new() })),
        );
        let diffs = comparators.compare_pair(&doc("base"), &doc("cmp"), 1, 1).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DifferenceKind::Text);
    }

    #[test]
    fn missing_extractors_produce_nothing() {
        let comparators = ContentComparators::none();
        let diffs = comparators.compare_pair(&doc("base"), &doc("cmp"), 1, 1).unwrap();
        assert!(diffs.is_empty());
    }
}
