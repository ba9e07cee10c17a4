use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use crate::base::{
    linear_determinant, AtomType, Lattice, Linear, MapError, PrimSearchData,
    StructureSearchData,
};
use crate::math::WignerSeitz;

use super::lattice_mapping::LatticeMapping;

/// Bijection between linear supercell site indices and
/// `(sublattice, unit cell)` pairs.
///
/// Sites are ordered sublattice-major: `l = b * num_cells + cell`.
#[derive(Debug, Clone)]
pub struct SiteIndexConverter {
    num_cells: usize,
    unitcells: Vec<Vector3<i32>>,
    cell_of_signature: HashMap<[i64; 3], usize>,
    adjugate: Matrix3<i64>,
    det: i64,
}

impl SiteIndexConverter {
    pub fn new(transformation: &Linear) -> Result<Self, MapError> {
        let det = linear_determinant(transformation) as i64;
        if det <= 0 {
            return Err(MapError::InvalidInput);
        }
        let adjugate = integer_adjugate(transformation);

        // Coset representatives of Z^3 modulo the sublattice: with the
        // Hermite form diag (a, b, c), the box [0,a) x [0,b) x [0,c)
        let h = crate::math::hnf(transformation);
        let (a, b, c) = (h[(0, 0)], h[(1, 1)], h[(2, 2)]);

        let mut unitcells = vec![];
        let mut cell_of_signature = HashMap::new();
        for i in 0..a {
            for j in 0..b {
                for k in 0..c {
                    let cell = Vector3::new(i, j, k);
                    let signature = residue_signature(&adjugate, det, &cell);
                    cell_of_signature.insert(signature, unitcells.len());
                    unitcells.push(cell);
                }
            }
        }
        debug_assert_eq!(unitcells.len(), det as usize);

        Ok(Self {
            num_cells: det as usize,
            unitcells,
            cell_of_signature,
            adjugate,
            det,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Linear site index of `(sublattice, unitcell)`, wrapping the unit cell
    /// into the supercell
    pub fn linear_index(&self, sublattice: usize, unitcell: &Vector3<i32>) -> usize {
        let signature = residue_signature(&self.adjugate, self.det, unitcell);
        let cell = self.cell_of_signature[&signature];
        sublattice * self.num_cells + cell
    }

    pub fn sublattice(&self, linear_index: usize) -> usize {
        linear_index / self.num_cells
    }

    pub fn unitcell(&self, linear_index: usize) -> Vector3<i32> {
        self.unitcells[linear_index % self.num_cells]
    }
}

/// `transformation^-1 * cell mod 1`, exactly, as `adj * cell mod det`
fn residue_signature(adjugate: &Matrix3<i64>, det: i64, cell: &Vector3<i32>) -> [i64; 3] {
    let v = adjugate * cell.map(|e| e as i64);
    [
        v[0].rem_euclid(det),
        v[1].rem_euclid(det),
        v[2].rem_euclid(det),
    ]
}

fn integer_adjugate(m: &Linear) -> Matrix3<i64> {
    let m = m.map(|e| e as i64);
    let cofactor = |i: usize, j: usize| -> i64 {
        let rows: Vec<usize> = (0..3).filter(|&r| r != i).collect();
        let cols: Vec<usize> = (0..3).filter(|&c| c != j).collect();
        let minor = m[(rows[0], cols[0])] * m[(rows[1], cols[1])]
            - m[(rows[0], cols[1])] * m[(rows[1], cols[0])];
        if (i + j) % 2 == 0 { minor } else { -minor }
    };
    // Adjugate is the transposed cofactor matrix
    Matrix3::from_fn(|i, j| cofactor(j, i))
}

/// Immutable data shared by every candidate derived from one lattice mapping
#[derive(Debug)]
pub struct LatticeMappingSearchData {
    pub prim: Arc<PrimSearchData>,
    pub structure: Arc<StructureSearchData>,
    pub lattice_mapping: LatticeMapping,
    /// Combined supercell transform `T * N`
    pub transformation: Linear,
    /// Undeformed superlattice `L1 * T * N`
    pub supercell_lattice: Lattice,
    pub converter: SiteIndexConverter,
    /// Wigner-Seitz cell of the supercell lattice, for minimum images
    pub(crate) wigner_seitz: WignerSeitz,
    /// Child atom coordinates pulled back to the parent frame, `F^-1 * r`
    pub atom_coordinate_cart_in_supercell: Vec<Vector3<f64>>,
    pub supercell_site_coordinate_cart: Vec<Vector3<f64>>,
}

impl LatticeMappingSearchData {
    pub fn new(
        prim: Arc<PrimSearchData>,
        structure: Arc<StructureSearchData>,
        lattice_mapping: LatticeMapping,
    ) -> Result<Self, MapError> {
        let transformation = lattice_mapping.combined_transformation();
        let supercell_lattice = lattice_mapping.ideal_superlattice(&prim.lattice)?;
        let converter = SiteIndexConverter::new(&transformation)?;

        let num_sites = prim.num_sites() * converter.num_cells();
        if structure.num_atoms() > num_sites {
            return Err(MapError::InvalidInput);
        }
        if structure.num_atoms() < num_sites && !prim.vacancies_allowed {
            return Err(MapError::InvalidInput);
        }

        let deformation_inverse = lattice_mapping
            .deformation_gradient
            .try_inverse()
            .ok_or(MapError::InvalidInput)?;
        let atom_coordinate_cart_in_supercell = structure
            .atom_coordinate_cart
            .iter()
            .map(|r| deformation_inverse * r)
            .collect();

        let mut supercell_site_coordinate_cart = Vec::with_capacity(num_sites);
        for b in 0..prim.num_sites() {
            for cell in 0..converter.num_cells() {
                let unitcell = converter.unitcells[cell];
                supercell_site_coordinate_cart.push(
                    prim.site_coordinate_cart[b]
                        + prim.lattice.basis * unitcell.map(|e| e as f64),
                );
            }
        }

        let wigner_seitz = WignerSeitz::new(&supercell_lattice)?;

        Ok(Self {
            prim,
            structure,
            lattice_mapping,
            transformation,
            supercell_lattice,
            converter,
            wigner_seitz,
            atom_coordinate_cart_in_supercell,
            supercell_site_coordinate_cart,
        })
    }

    pub fn num_supercell_sites(&self) -> usize {
        self.supercell_site_coordinate_cart.len()
    }

    /// Species labels permitted on the given supercell site
    pub fn allowed_atom_types(&self, site: usize) -> &[AtomType] {
        &self.prim.allowed_atom_types[self.converter.sublattice(site)]
    }

    pub fn site_allows(&self, site: usize, atom_type: &str) -> bool {
        self.prim
            .site_allows(self.converter.sublattice(site), atom_type)
    }
}

/// Sanity helper shared by tests: `F * L1 * T * N` reproduces the child basis
#[cfg(test)]
pub(crate) fn mapping_residual(data: &LatticeMappingSearchData) -> f64 {
    let mapped = data.lattice_mapping.deformation_gradient
        * data.prim.lattice.basis
        * crate::base::linear_as_f64(&data.transformation);
    (mapped - data.structure.lattice.basis).norm()
}
