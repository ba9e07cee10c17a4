use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};

use crate::base::{Lattice, MapError};

/// Voronoi reduction is declared non-convergent after this many subtractions
const MAX_REDUCTION_STEPS: usize = 16;

/// Wigner-Seitz cell of a lattice: the relevant lattice translations and the
/// queries needed for minimum-image reduction
#[derive(Debug, Clone)]
pub struct WignerSeitz {
    basis: Matrix3<f64>,
    inv_basis: Matrix3<f64>,
    tol: f64,
    /// Candidate Wigner-Seitz facet vectors from the Minkowski-reduced basis
    vectors: Vec<Vector3<f64>>,
    inner_radius: f64,
}

impl WignerSeitz {
    pub fn new(lattice: &Lattice) -> Result<Self, MapError> {
        let (reduced, _) = lattice.minkowski_reduce()?;

        // For a Minkowski-reduced basis, all Wigner-Seitz relevant vectors
        // have coefficients in {-1, 0, 1}
        let mut vectors = Vec::with_capacity(26);
        for (i, j, k) in iproduct!(-1..=1, -1..=1, -1..=1) {
            if (i, j, k) == (0, 0, 0) {
                continue;
            }
            vectors.push(reduced.basis * Vector3::new(i as f64, j as f64, k as f64));
        }
        let inner_radius = vectors
            .iter()
            .map(|r| r.norm() / 2.0)
            .fold(f64::INFINITY, f64::min);

        Ok(Self {
            basis: lattice.basis,
            inv_basis: lattice.inverse(),
            tol: lattice.tol,
            vectors,
            inner_radius,
        })
    }

    pub fn inner_radius(&self) -> f64 {
        self.inner_radius
    }

    /// Return the maximum Voronoi measure of `v` and the lattice translation
    /// attaining it. The measure is at most one iff `v` lies in the closed
    /// Wigner-Seitz cell.
    pub fn measure(&self, v: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let mut max_measure = f64::NEG_INFINITY;
        let mut argmax = Vector3::zeros();
        for r in self.vectors.iter() {
            let m = v.dot(r) / (0.5 * r.norm_squared());
            if m > max_measure {
                max_measure = m;
                argmax = *r;
            }
        }
        (max_measure, argmax)
    }

    /// Minimum image within the first Brillouin sphere: exact whenever
    /// `|result| < inner_radius`
    pub fn fast_min_image(&self, v: &Vector3<f64>) -> Vector3<f64> {
        v - self.basis * (self.inv_basis * v).map(|e| e.round())
    }

    /// Unique Wigner-Seitz minimum image of `v`
    pub fn reduce(&self, v: &Vector3<f64>) -> Result<Vector3<f64>, MapError> {
        let mut d = self.fast_min_image(v);
        for _ in 0..MAX_REDUCTION_STEPS {
            let (measure, translation) = self.measure(&d);
            if measure <= 1.0 + self.tol {
                return Ok(d);
            }
            d -= translation;
        }
        Err(MapError::NumericalTolerance)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{matrix, Matrix3, Vector3};
    use rand::prelude::*;
    use rand::rngs::StdRng;

    use crate::base::Lattice;

    use super::WignerSeitz;

    #[test]
    fn test_cubic_min_image() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let ws = WignerSeitz::new(&lattice).unwrap();
        assert_relative_eq!(ws.inner_radius(), 0.5);

        let d = ws.reduce(&Vector3::new(0.9, -1.4, 2.0)).unwrap();
        assert_relative_eq!(d, Vector3::new(-0.1, -0.4, 0.0), epsilon = 1e-12);

        let (measure, _) = ws.measure(&Vector3::new(0.75, 0.0, 0.0));
        assert_relative_eq!(measure, 1.5);
    }

    #[test]
    fn test_skewed_lattice_reduction() {
        // Strongly sheared basis where rounding fractional coordinates alone
        // does not give the shortest image
        let lattice = Lattice::from_basis(matrix![
            1.0, 0.9, 0.0;
            0.0, 0.45, 0.0;
            0.0, 0.0, 1.0;
        ])
        .unwrap();
        let ws = WignerSeitz::new(&lattice).unwrap();

        let mut rng: StdRng = SeedableRng::from_seed([1; 32]);
        for _ in 0..256 {
            let v = Vector3::new(
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
            );
            let d = ws.reduce(&v).unwrap();

            // The image is equivalent to v modulo the lattice
            let frac = lattice.fractional_coords(&(v - d));
            assert_relative_eq!(frac, frac.map(|e| e.round()), epsilon = 1e-8);

            // No further Wigner-Seitz translation shortens it
            let (measure, _) = ws.measure(&d);
            assert!(measure <= 1.0 + lattice.tol);
            assert!(d.norm() <= ws.fast_min_image(&v).norm() + 1e-12);
        }
    }
}
