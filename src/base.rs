mod error;
mod lattice;
mod operation;
mod permutation;
mod structures;
mod tolerance;
mod transformation;

pub use error::MapError;
pub use lattice::Lattice;
pub use operation::{
    generate_group, CartesianRotation, Operation, Operations, Rotation, Translation,
};
pub use permutation::Permutation;
pub use structures::{
    is_vacancy, AtomType, DisplacementMode, PrimSearchData, StructureSearchData,
};
pub use tolerance::{DEFAULT_LATTICE_TOL, EPS};
pub use transformation::{
    is_unimodular, linear_as_f64, linear_determinant, unimodular_inverse, Linear,
    UnimodularLinear,
};
