mod hungarian;
mod murty;

pub use hungarian::{solve_assignment, Assignment, CostMatrix, ScoredAssignment};
pub use murty::{k_best_assignments, MurtyEnumerator};
