//! Crystal-structure mapping: given a primitive reference crystal and a
//! candidate structure, enumerate the lowest-cost ways the candidate maps
//! onto a superstructure of the reference.
//!
//! A mapping has three parts: a lattice mapping `F * L1 * T * N = L2`, a
//! rigid trial translation, and an assignment of atoms (including synthetic
//! vacancies) to sites. The three searches are fused in
//! [`map_structures`]; [`map_lattices`] and [`mapping::map_atoms`] expose
//! the lattice and assignment layers on their own.

#[allow(unused_imports)]
#[macro_use]
extern crate approx;

pub mod assign;
pub mod base;
pub mod mapping;

mod math;

pub use crate::base::{Lattice, MapError, Operation, Operations, PrimSearchData, StructureSearchData};
pub use crate::mapping::{
    map_atoms, map_structures, AtomMapOptions, LatticeMapOptions, ScoredAtomMapping,
    ScoredLatticeMapping, ScoredStructureMapping, StructureMapOptions,
    StructureMappingResults,
};

use crate::mapping::LatticeMappingEnumerator;

/// Enumerate lattice mappings from a parent lattice onto a child lattice,
/// sorted by strain cost under the options' ceiling
pub fn map_lattices(
    prim_lattice: &Lattice,
    child_lattice: &Lattice,
    prim_factor_group: &Operations,
    options: &LatticeMapOptions,
) -> Result<Vec<ScoredLatticeMapping>, MapError> {
    LatticeMappingEnumerator::new(prim_lattice, child_lattice, prim_factor_group, options)?
        .collect()
}
