mod atom_cost;
mod canonical;
mod lattice_mapping;
mod lattice_search;
mod search_data;
mod strain;
mod structure_search;

pub use atom_cost::{
    map_atoms, symmetry_breaking_atom_cost, trial_translations, AtomCostFunction,
    AtomMapOptions, AtomMapping, AtomMappingSearchData, ScoredAtomMapping,
};
pub use canonical::{CanonicalizationContext, Fingerprint};
pub use lattice_mapping::{LatticeMapping, ScoredLatticeMapping};
pub use lattice_search::{LatticeMapOptions, LatticeMappingEnumerator};
pub use search_data::{LatticeMappingSearchData, SiteIndexConverter};
pub use strain::{
    isotropic_strain_cost, lattice_cost, right_stretch_tensor,
    symmetry_breaking_strain_cost, LatticeCostFunction,
};
pub use structure_search::{
    map_structures, ScoredStructureMapping, StructureMapOptions, StructureMapping,
    StructureMappingResults,
};
