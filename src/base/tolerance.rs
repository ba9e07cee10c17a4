pub const EPS: f64 = 1e-8;

/// Default length tolerance for lattices (in the same unit as basis vectors)
pub const DEFAULT_LATTICE_TOL: f64 = 1e-5;
