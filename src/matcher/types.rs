// src/matcher/types.rs

use std::cmp::Ordering;

/// One proposed (base page, compare page) comparison. Priority 0 is the
/// same-index pair; gap pairs carry their index distance; random extras
/// sort last. Generated fresh per match operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateTask {
    pub base_page: u32,
    pub compare_page: u32,
    pub priority: u32,
}

impl CandidateTask {
    pub fn new(base_page: u32, compare_page: u32, priority: u32) -> Self {
        Self { base_page, compare_page, priority }
    }
}

impl Ord for CandidateTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.base_page.cmp(&other.base_page))
            .then(self.compare_page.cmp(&other.compare_page))
    }
}

impl PartialOrd for CandidateTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dense row-major cost matrix, rows = base pages, columns = compare
/// pages. Cost is 1 - similarity; pairs never scored or scored below the
/// match threshold carry the maximum cost of 1.0. Built once per match
/// operation and consumed by the assignment solver.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl CostMatrix {
    pub fn filled(rows: usize, cols: usize, cost: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![cost; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, cost: f64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = cost;
    }
}

/// Result of running the scoring phase: which tasks completed, and
/// whether the phase gave up early.
#[derive(Debug, Default)]
pub struct ScoringOutcome {
    /// (task, similarity) for every pair that scored successfully.
    pub scored: Vec<(CandidateTask, f64)>,
    /// Pairs dropped after exhausting retries.
    pub failed: usize,
    /// True when the overall match deadline expired mid-phase.
    pub deadline_expired: bool,
    /// True when early stopping cut the remaining candidates.
    pub stopped_early: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_order_by_priority_first() {
        let mut tasks = vec![
            CandidateTask::new(3, 4, 1),
            CandidateTask::new(1, 1, 0),
            CandidateTask::new(2, 4, 2),
            CandidateTask::new(2, 2, 0),
        ];
        tasks.sort();
        assert_eq!(tasks[0], CandidateTask::new(1, 1, 0));
        assert_eq!(tasks[1], CandidateTask::new(2, 2, 0));
        assert_eq!(tasks[3], CandidateTask::new(2, 4, 2));
    }

    #[test]
    fn cost_matrix_indexing() {
        let mut matrix = CostMatrix::filled(2, 3, 1.0);
        matrix.set(1, 2, 0.25);
        assert_eq!(matrix.get(1, 2), 0.25);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 3);
    }
}
