use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::base::{
    is_unimodular, linear_as_f64, linear_determinant, Lattice, Linear, MapError,
    UnimodularLinear, EPS,
};

/// Relates a parent lattice `L1` and a child lattice `L2` through
/// `F * L1 * T * N = L2`: a deformation gradient `F`, an integer
/// transformation `T` to a superlattice, and a unimodular reorientation `N`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticeMapping {
    pub deformation_gradient: Matrix3<f64>,
    pub transformation: Linear,
    pub reorientation: UnimodularLinear,
}

impl LatticeMapping {
    pub fn new(
        deformation_gradient: Matrix3<f64>,
        transformation: Linear,
        reorientation: UnimodularLinear,
    ) -> Result<Self, MapError> {
        if linear_determinant(&transformation) <= 0
            || !is_unimodular(&reorientation)
            || deformation_gradient.determinant().abs() < EPS
        {
            return Err(MapError::InvalidInput);
        }
        Ok(Self {
            deformation_gradient,
            transformation,
            reorientation,
        })
    }

    /// The combined integer supercell transform `T * N`
    pub fn combined_transformation(&self) -> Linear {
        self.transformation * self.reorientation
    }

    /// Undeformed superlattice `L1 * T * N` of the parent
    pub fn ideal_superlattice(&self, prim_lattice: &Lattice) -> Result<Lattice, MapError> {
        let combined = self.combined_transformation();
        Lattice::new(
            prim_lattice.basis * linear_as_f64(&combined),
            prim_lattice.tol,
        )
    }

    /// Image `F * L1 * T * N` of the superlattice in the child's frame
    pub fn mapped_superlattice(&self, prim_lattice: &Lattice) -> Result<Lattice, MapError> {
        let ideal = self.ideal_superlattice(prim_lattice)?;
        Lattice::new(self.deformation_gradient * ideal.basis, prim_lattice.tol)
    }
}

/// Lattice mapping together with its strain cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredLatticeMapping {
    pub cost: f64,
    pub mapping: LatticeMapping,
}
