mod elementary;
mod hnf;
mod minkowski;
mod voronoi;

pub use hnf::{hnf, hnf_matrices_of_determinant};
pub use minkowski::{is_minkowski_reduced, minkowski_reduce};
pub use voronoi::WignerSeitz;
