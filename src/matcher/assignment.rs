//! Page assignment from a cost matrix. Small matrices get a primal-dual
//! Hungarian solve with a hard iteration cap; when the cap trips, the
//! partial assignment found so far is returned instead of looping on.
//! Large documents and the fast profile skip straight to a same-index-
//! first greedy pass. Either way, an assignment whose similarity falls
//! below the match threshold is demoted to unmatched, never forced.

use log::{debug, info, warn};

use crate::config::subsystems::MatcherConfig;
use crate::matcher::types::CostMatrix;

const INF: f64 = f64::INFINITY;

/// Iteration budget multiplier: the solver may spend this many inner
/// relaxation steps per matrix cell before giving up.
const ITERATION_FACTOR: usize = 8;

pub struct AssignmentSolver<'a> {
    config: &'a MatcherConfig,
}

impl<'a> AssignmentSolver<'a> {
    pub fn new(config: &'a MatcherConfig) -> Self {
        Self { config }
    }

    /// Maps each base-page row to at most one compare-page column,
    /// minimizing total cost. The returned vector has one entry per row.
    pub fn solve(&self, matrix: &CostMatrix) -> Vec<Option<usize>> {
        let rows = matrix.rows();
        let cols = matrix.cols();
        if rows == 0 || cols == 0 {
            return vec![None; rows];
        }

        let use_greedy = self.config.profile.is_fast()
            || rows.max(cols) > self.config.hungarian_max_pages;

        let mut assignment = if use_greedy {
            debug!("Using greedy assignment for {}x{} matrix", rows, cols);
            self.greedy(matrix)
        } else {
            debug!("Using Hungarian assignment for {}x{} matrix", rows, cols);
            hungarian_capped(matrix, rows * cols * ITERATION_FACTOR)
        };

        // Demote below-threshold assignments rather than forcing them
        let max_cost = 1.0 - self.config.visual_similarity_threshold;
        let mut demoted = 0;
        for (row, slot) in assignment.iter_mut().enumerate() {
            if let Some(col) = *slot {
                if matrix.get(row, col) > max_cost + f64::EPSILON {
                    *slot = None;
                    demoted += 1;
                }
            }
        }
        if demoted > 0 {
            debug!("Demoted {} below-threshold assignments to unmatched", demoted);
        }

        let matched = assignment.iter().filter(|slot| slot.is_some()).count();
        info!("Assignment complete: {}/{} base pages matched", matched, rows);
        assignment
    }

    /// Same-index-first greedy pass: each base page takes its own index if
    /// that clears the threshold, otherwise the cheapest remaining column.
    fn greedy(&self, matrix: &CostMatrix) -> Vec<Option<usize>> {
        let rows = matrix.rows();
        let cols = matrix.cols();
        let max_cost = 1.0 - self.config.visual_similarity_threshold;

        let mut taken = vec![false; cols];
        let mut assignment = vec![None; rows];

        for row in 0..rows {
            if row < cols && !taken[row] && matrix.get(row, row) <= max_cost + f64::EPSILON {
                taken[row] = true;
                assignment[row] = Some(row);
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for col in 0..cols {
                if taken[col] {
                    continue;
                }
                let cost = matrix.get(row, col);
                if cost > max_cost + f64::EPSILON {
                    continue;
                }
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((col, cost));
                }
            }
            if let Some((col, _)) = best {
                taken[col] = true;
                assignment[row] = Some(col);
            }
        }

        assignment
    }
}

/// Hungarian algorithm (potentials form) with a hard cap on inner
/// relaxation steps. Requires rows <= cols internally; wider-than-tall
/// input is solved transposed.
fn hungarian_capped(matrix: &CostMatrix, max_iterations: usize) -> Vec<Option<usize>> {
    let rows = matrix.rows();
    let cols = matrix.cols();

    if rows > cols {
        // Solve the transposed problem, then invert the mapping
        let mut transposed = CostMatrix::filled(cols, rows, 1.0);
        for r in 0..rows {
            for c in 0..cols {
                transposed.set(c, r, matrix.get(r, c));
            }
        }
        let col_to_row = hungarian_capped(&transposed, max_iterations);
        let mut assignment = vec![None; rows];
        for (col, row) in col_to_row.into_iter().enumerate() {
            if let Some(row) = row {
                assignment[row] = Some(col);
            }
        }
        return assignment;
    }

    // 1-indexed arrays per the standard formulation
    let n = rows;
    let m = cols;
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1]; // p[j] = row matched to column j
    let mut way = vec![0usize; m + 1];

    let mut iterations = 0usize;
    let mut capped = false;

    'rows: for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![INF; m + 1];
        let mut used = vec![false; m + 1];
        let mut augment = true;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                warn!(
                    "Hungarian solver hit iteration cap ({}) at row {}/{}, returning partial assignment",
                    max_iterations, i, n
                );
                // Undo the half-built augmenting path for this row
                p[0] = 0;
                capped = true;
                break 'rows;
            }

            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = matrix.get(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            if !delta.is_finite() {
                // No augmenting path for this row; leave it unassigned
                p[0] = 0;
                augment = false;
                break;
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        if !augment {
            continue;
        }

        // Walk the augmenting path backwards, flipping matches
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    if capped {
        debug!("Returning best partial Hungarian assignment");
    }

    let mut assignment = vec![None; n];
    for j in 1..=m {
        if p[j] > 0 {
            assignment[p[j] - 1] = Some(j - 1);
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::MatchingProfile;

    fn config(threshold: f64) -> MatcherConfig {
        MatcherConfig {
            visual_similarity_threshold: threshold,
            ..MatcherConfig::default()
        }
    }

    fn diagonal_matrix(n: usize) -> CostMatrix {
        let mut matrix = CostMatrix::filled(n, n, 1.0);
        for i in 0..n {
            matrix.set(i, i, 0.0);
        }
        matrix
    }

    #[test]
    fn zero_diagonal_yields_identity() {
        let matrix = diagonal_matrix(5);
        let cfg = config(0.7);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        for (row, col) in assignment.iter().enumerate() {
            assert_eq!(*col, Some(row));
        }
    }

    #[test]
    fn shifted_pages_are_recovered() {
        // Base pages [1,2,3], compare pages [1,3]: page 2 deleted.
        // Row 0 matches col 0, row 2 matches col 1, row 1 unmatched.
        let mut matrix = CostMatrix::filled(3, 2, 1.0);
        matrix.set(0, 0, 0.02);
        matrix.set(2, 1, 0.05);
        let cfg = config(0.7);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        assert_eq!(assignment[0], Some(0));
        assert_eq!(assignment[1], None);
        assert_eq!(assignment[2], Some(1));
    }

    #[test]
    fn below_threshold_pairs_are_demoted() {
        let mut matrix = CostMatrix::filled(2, 2, 1.0);
        matrix.set(0, 0, 0.1);  // similarity 0.9, keeps
        matrix.set(1, 1, 0.6);  // similarity 0.4, demoted
        let cfg = config(0.7);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        assert_eq!(assignment[0], Some(0));
        assert_eq!(assignment[1], None);
    }

    #[test]
    fn wide_matrix_assigns_all_rows() {
        let mut matrix = CostMatrix::filled(2, 4, 1.0);
        matrix.set(0, 2, 0.0);
        matrix.set(1, 0, 0.1);
        let cfg = config(0.5);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        assert_eq!(assignment[0], Some(2));
        assert_eq!(assignment[1], Some(0));
    }

    #[test]
    fn tall_matrix_assigns_each_column_once() {
        let mut matrix = CostMatrix::filled(4, 2, 1.0);
        matrix.set(0, 0, 0.05);
        matrix.set(3, 1, 0.05);
        let cfg = config(0.7);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        assert_eq!(assignment[0], Some(0));
        assert_eq!(assignment[3], Some(1));
        assert_eq!(assignment[1], None);
        assert_eq!(assignment[2], None);

        let mut used = std::collections::HashSet::new();
        for col in assignment.into_iter().flatten() {
            assert!(used.insert(col));
        }
    }

    #[test]
    fn fast_profile_uses_greedy_same_index_first() {
        let mut matrix = CostMatrix::filled(3, 3, 1.0);
        matrix.set(0, 0, 0.1);
        matrix.set(1, 1, 0.2);
        matrix.set(1, 0, 0.05); // cheaper, but 0 is taken by same-index
        matrix.set(2, 2, 0.1);
        let cfg = MatcherConfig {
            profile: MatchingProfile::Fast,
            visual_similarity_threshold: 0.7,
            ..MatcherConfig::default()
        };
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        assert_eq!(assignment, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn large_matrices_fall_back_to_greedy() {
        let n = 200; // over hungarian_max_pages
        let matrix = diagonal_matrix(n);
        let cfg = config(0.7);
        let assignment = AssignmentSolver::new(&cfg).solve(&matrix);
        for (row, col) in assignment.iter().enumerate() {
            assert_eq!(*col, Some(row));
        }
    }

    #[test]
    fn iteration_cap_returns_partial_not_hang() {
        // A cap of almost nothing must still return a well-formed vector
        let matrix = diagonal_matrix(6);
        let assignment = hungarian_capped(&matrix, 3);
        assert_eq!(assignment.len(), 6);
        let mut used = std::collections::HashSet::new();
        for col in assignment.into_iter().flatten() {
            assert!(used.insert(col));
        }
    }

    #[test]
    fn empty_matrix_is_handled() {
        let matrix = CostMatrix::filled(0, 0, 1.0);
        let cfg = config(0.7);
        assert!(AssignmentSolver::new(&cfg).solve(&matrix).is_empty());
    }
}
