use nalgebra::base::{Matrix3, Vector3};

use super::error::MapError;
use super::lattice::Lattice;
use super::operation::{Operation, Operations};

/// Species label of an occupant. Vacancies are ordinary labels recognized by
/// [`is_vacancy`].
pub type AtomType = String;

/// Return true if the label names a vacancy
pub fn is_vacancy(label: &str) -> bool {
    matches!(label, "Va" | "VA" | "va" | "Vac")
}

/// A displacement field over prim sites, one 3-vector per site
pub type DisplacementMode = Vec<Vector3<f64>>;

#[derive(Debug, Clone)]
/// Immutable description of the reference crystal, shared by all records
/// derived during a mapping search
pub struct PrimSearchData {
    pub lattice: Lattice,
    /// Cartesian coordinate of each basis site
    pub site_coordinate_cart: Vec<Vector3<f64>>,
    /// Species labels permitted on each basis site
    pub allowed_atom_types: Vec<Vec<AtomType>>,
    /// True if any site admits a vacancy
    pub vacancies_allowed: bool,
    pub factor_group: Operations,
    /// Cartesian rotation matrix of each factor-group operation
    pub factor_group_cart_rotations: Vec<Matrix3<f64>>,
    /// Cartesian pure translations that fix the prim (always contains zero)
    pub internal_translations_cart: Vec<Vector3<f64>>,
    /// Symmetry-invariant displacement modes, required only for the
    /// symmetry-breaking atom cost
    pub sym_invariant_displacement_modes: Option<Vec<DisplacementMode>>,
}

impl PrimSearchData {
    /// Build the prim record from fractional site coordinates.
    /// An empty `factor_group` defaults to the identity group.
    pub fn new(
        lattice: Lattice,
        positions: Vec<Vector3<f64>>,
        allowed_atom_types: Vec<Vec<AtomType>>,
        factor_group: Operations,
    ) -> Result<Self, MapError> {
        if positions.is_empty() || positions.len() != allowed_atom_types.len() {
            return Err(MapError::InvalidInput);
        }
        if allowed_atom_types.iter().any(|types| types.is_empty()) {
            return Err(MapError::InvalidInput);
        }

        let factor_group = if factor_group.is_empty() {
            vec![Operation::identity()]
        } else {
            factor_group
        };

        let site_coordinate_cart = positions
            .iter()
            .map(|pos| lattice.cartesian_coords(pos))
            .collect::<Vec<_>>();
        let factor_group_cart_rotations = factor_group
            .iter()
            .map(|op| op.cartesian_rotation(&lattice))
            .collect::<Vec<_>>();

        let mut internal_translations_cart = factor_group
            .iter()
            .filter(|op| op.is_pure_translation())
            .map(|op| op.cartesian_translation(&lattice))
            .collect::<Vec<_>>();
        if !internal_translations_cart
            .iter()
            .any(|t| t.norm() < lattice.tol)
        {
            internal_translations_cart.push(Vector3::zeros());
        }

        let vacancies_allowed = allowed_atom_types
            .iter()
            .any(|types| types.iter().any(|t| is_vacancy(t)));

        Ok(Self {
            lattice,
            site_coordinate_cart,
            allowed_atom_types,
            vacancies_allowed,
            factor_group,
            factor_group_cart_rotations,
            internal_translations_cart,
            sym_invariant_displacement_modes: None,
        })
    }

    pub fn with_displacement_modes(mut self, modes: Vec<DisplacementMode>) -> Self {
        self.sym_invariant_displacement_modes = Some(modes);
        self
    }

    pub fn num_sites(&self) -> usize {
        self.site_coordinate_cart.len()
    }

    /// Return true if `atom_type` may occupy the `b`-th basis site
    pub fn site_allows(&self, b: usize, atom_type: &str) -> bool {
        if is_vacancy(atom_type) {
            self.allowed_atom_types[b].iter().any(|t| is_vacancy(t))
        } else {
            self.allowed_atom_types[b].iter().any(|t| t == atom_type)
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable description of the candidate structure being mapped
pub struct StructureSearchData {
    pub lattice: Lattice,
    /// Cartesian coordinate of each atom
    pub atom_coordinate_cart: Vec<Vector3<f64>>,
    pub atom_types: Vec<AtomType>,
    pub factor_group: Operations,
}

impl StructureSearchData {
    /// Build the structure record from fractional atom coordinates.
    /// `factor_group` defaults to the identity group.
    pub fn new(
        lattice: Lattice,
        positions: Vec<Vector3<f64>>,
        atom_types: Vec<AtomType>,
        factor_group: Option<Operations>,
    ) -> Result<Self, MapError> {
        if positions.is_empty() || positions.len() != atom_types.len() {
            return Err(MapError::InvalidInput);
        }
        let atom_coordinate_cart = positions
            .iter()
            .map(|pos| lattice.cartesian_coords(pos))
            .collect();
        Ok(Self {
            lattice,
            atom_coordinate_cart,
            atom_types,
            factor_group: factor_group.unwrap_or_else(|| vec![Operation::identity()]),
        })
    }

    pub fn num_atoms(&self) -> usize {
        self.atom_coordinate_cart.len()
    }
}
