//! Page matching: candidate generation, batch scoring, assignment, and
//! the strategy facade that ties them together.

pub mod assignment;
pub mod candidates;
pub mod scorer;
pub mod strategy;
pub mod types;

pub use assignment::AssignmentSolver;
pub use candidates::CandidateGenerator;
pub use scorer::BatchScorer;
pub use strategy::DocumentMatcher;
pub use types::{CandidateTask, CostMatrix, ScoringOutcome};
