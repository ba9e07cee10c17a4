use nalgebra::base::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::{is_minkowski_reduced, minkowski_reduce, WignerSeitz};

use super::error::MapError;
use super::tolerance::{DEFAULT_LATTICE_TOL, EPS};
use super::transformation::{linear_as_f64, linear_determinant, Linear, UnimodularLinear};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Basis vectors of a lattice together with its length tolerance
pub struct Lattice {
    /// basis.column(i) is the i-th basis vector
    pub basis: Matrix3<f64>,
    /// Length tolerance used when comparing coordinates in this lattice
    pub tol: f64,
}

impl Lattice {
    /// Create a new lattice from column basis vectors
    pub fn new(basis: Matrix3<f64>, tol: f64) -> Result<Self, MapError> {
        if tol < 0.0 || basis.determinant().abs() < EPS {
            return Err(MapError::InvalidInput);
        }
        Ok(Self { basis, tol })
    }

    /// Create a new lattice with the default length tolerance
    pub fn from_basis(basis: Matrix3<f64>) -> Result<Self, MapError> {
        Self::new(basis, DEFAULT_LATTICE_TOL)
    }

    /// Inverse of the basis matrix.
    /// The constructor guarantees the basis is invertible.
    pub fn inverse(&self) -> Matrix3<f64> {
        self.basis.try_inverse().unwrap()
    }

    /// Return volume of the cell
    pub fn volume(&self) -> f64 {
        self.basis.determinant().abs()
    }

    /// Return cartesian coordinates from the given fractional coordinates
    pub fn cartesian_coords(&self, fractional_coords: &Vector3<f64>) -> Vector3<f64> {
        self.basis * fractional_coords
    }

    /// Return fractional coordinates from the given cartesian coordinates
    pub fn fractional_coords(&self, cartesian_coords: &Vector3<f64>) -> Vector3<f64> {
        self.inverse() * cartesian_coords
    }

    /// Return the superlattice `basis * transformation`.
    /// The transformation must have a positive determinant.
    pub fn superlattice(&self, transformation: &Linear) -> Result<Self, MapError> {
        if linear_determinant(transformation) <= 0 {
            return Err(MapError::InvalidInput);
        }
        Self::new(self.basis * linear_as_f64(transformation), self.tol)
    }

    /// Return Minkowski reduced lattice and transformation matrix to it
    pub fn minkowski_reduce(&self) -> Result<(Self, UnimodularLinear), MapError> {
        let (reduced_basis, trans_mat) = minkowski_reduce(&self.basis);
        if !is_minkowski_reduced(&reduced_basis) {
            return Err(MapError::NumericalTolerance);
        }
        Ok((
            Self {
                basis: reduced_basis,
                tol: self.tol,
            },
            trans_mat,
        ))
    }

    /// Radius of the largest sphere centered at the origin that fits inside
    /// the Wigner-Seitz cell
    pub fn inner_voronoi_radius(&self) -> Result<f64, MapError> {
        Ok(WignerSeitz::new(self)?.inner_radius())
    }

    /// Return the Voronoi measure of `v` and the lattice translation attaining it.
    /// The measure is at most one iff `v` lies in the closed Wigner-Seitz cell.
    pub fn max_voronoi_measure(
        &self,
        v: &Vector3<f64>,
    ) -> Result<(f64, Vector3<f64>), MapError> {
        Ok(WignerSeitz::new(self)?.measure(v))
    }
}
