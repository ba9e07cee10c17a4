use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
/// Error types for the **crysmap** library
pub enum MapError {
    #[error("Invalid input for mapping search")]
    InvalidInput,
    #[error("No perfect matching with finite cost")]
    InfeasibleAssignment,
    #[error("No assignment under the requested cost bound")]
    NoAssignmentsUnderBound,
    #[error("Voronoi reduction failed to converge")]
    NumericalTolerance,
}
