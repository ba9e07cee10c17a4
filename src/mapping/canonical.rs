use log::debug;
use nalgebra::{Matrix3, Vector3};

use crate::base::{is_vacancy, Operation, Permutation, StructureSearchData};
use crate::math::hnf;

use super::atom_cost::AtomMapping;
use super::search_data::LatticeMappingSearchData;

/// Sentinel replacing every vacancy column in a fingerprint: which synthetic
/// vacancy pads which empty site is not a physical distinction
const VACANCY: usize = usize::MAX;

/// Canonical identity of a structure mapping: the lexicographically smallest
/// `(supercell transform, permutation, translation)` triple over the
/// combined symmetry images
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    transformation: [i32; 9],
    permutation: Vec<usize>,
    translation: [i64; 3],
}

/// Symmetry representations of one lattice mapping: the parent factor-group
/// operations that stabilize the supercell, acting on sites, and the child
/// factor-group operations acting on atoms
#[derive(Debug)]
pub struct CanonicalizationContext {
    /// Cartesian `(rotation, translation)` of each stabilizing parent op
    cart_ops: Vec<(Matrix3<f64>, Vector3<f64>)>,
    site_perms: Vec<Permutation>,
    /// Cartesian translation of each child op, pulled back by `F^-1`
    pulled_back_translations: Vec<Vector3<f64>>,
    atom_perms: Vec<Permutation>,
    transformation_key: [i32; 9],
}

impl CanonicalizationContext {
    pub fn new(data: &LatticeMappingSearchData) -> Self {
        let canonical_transformation = hnf(&data.transformation);
        let mut cart_ops = vec![];
        let mut site_perms = vec![];
        for op in data.prim.factor_group.iter() {
            // Only operations fixing the sublattice permute its sites
            if hnf(&(op.rotation * data.transformation)) != canonical_transformation {
                continue;
            }
            match site_permutation(data, op) {
                Some(perm) => {
                    cart_ops.push((
                        op.cartesian_rotation(&data.prim.lattice),
                        op.cartesian_translation(&data.prim.lattice),
                    ));
                    site_perms.push(perm);
                }
                None => {
                    debug!("factor-group operation does not permute supercell sites");
                }
            }
        }

        if cart_ops.is_empty() {
            cart_ops.push((Matrix3::identity(), Vector3::zeros()));
            site_perms.push(Permutation::identity(data.num_supercell_sites()));
        }

        let deformation_inverse = data
            .lattice_mapping
            .deformation_gradient
            .try_inverse()
            .unwrap();
        let mut pulled_back_translations = vec![];
        let mut atom_perms = vec![];
        for op in data.structure.factor_group.iter() {
            match atom_permutation(&data.structure, op) {
                Some(perm) => {
                    pulled_back_translations.push(
                        deformation_inverse * op.cartesian_translation(&data.structure.lattice),
                    );
                    atom_perms.push(perm);
                }
                None => {
                    debug!("structure operation does not permute atoms");
                }
            }
        }
        if atom_perms.is_empty() {
            pulled_back_translations.push(Vector3::zeros());
            atom_perms.push(Permutation::identity(data.structure.num_atoms()));
        }

        Self {
            cart_ops,
            site_perms,
            pulled_back_translations,
            atom_perms,
            transformation_key: matrix_key(&canonical_transformation),
        }
    }

    /// Canonical fingerprint: minimum image over all represented `(g, h)`
    pub fn fingerprint(
        &self,
        data: &LatticeMappingSearchData,
        mapping: &AtomMapping,
    ) -> Fingerprint {
        let num_atoms = data.structure.num_atoms();
        let mut best: Option<(Vec<usize>, [i64; 3])> = None;

        for (g, (cart_rotation, cart_translation)) in self.cart_ops.iter().enumerate() {
            for h in 0..self.atom_perms.len() {
                let site_perm = &self.site_perms[g];
                let atom_perm = &self.atom_perms[h];

                let mut permutation = vec![VACANCY; mapping.permutation.len()];
                for (site, &col) in mapping.permutation.iter().enumerate() {
                    if col < num_atoms && !is_vacancy(&data.structure.atom_types[col]) {
                        permutation[site_perm.apply(site)] = atom_perm.apply(col);
                    }
                }

                let translation = cart_rotation * mapping.translation + cart_translation
                    - self.pulled_back_translations[h];
                let translation = quantized_fractional(data, &translation);

                let key = (permutation, translation);
                if best.as_ref().is_none_or(|b| key < *b) {
                    best = Some(key);
                }
            }
        }

        // The identity is always represented
        let (permutation, translation) = best.unwrap();
        Fingerprint {
            transformation: self.transformation_key,
            permutation,
            translation,
        }
    }

    /// Image of an atom mapping under the represented pair `(g, h)`.
    /// The image scores identically and fingerprints identically.
    pub fn transform(
        &self,
        data: &LatticeMappingSearchData,
        g: usize,
        h: usize,
        mapping: &AtomMapping,
    ) -> AtomMapping {
        let num_atoms = data.structure.num_atoms();
        let (cart_rotation, cart_translation) = &self.cart_ops[g];
        let site_perm = &self.site_perms[g];
        let atom_perm = &self.atom_perms[h];

        let num_sites = mapping.permutation.len();
        let mut permutation = vec![0; num_sites];
        let mut displacement = vec![Vector3::zeros(); num_sites];
        for (site, &col) in mapping.permutation.iter().enumerate() {
            let image_site = site_perm.apply(site);
            permutation[image_site] = if col < num_atoms {
                atom_perm.apply(col)
            } else {
                col
            };
            displacement[image_site] = cart_rotation * mapping.displacement[site];
        }

        AtomMapping {
            displacement,
            permutation,
            translation: cart_rotation * mapping.translation + cart_translation
                - self.pulled_back_translations[h],
        }
    }

    pub fn num_site_ops(&self) -> usize {
        self.cart_ops.len()
    }

    pub fn num_atom_ops(&self) -> usize {
        self.atom_perms.len()
    }
}

/// Permutation representation of a parent operation on supercell sites:
/// `perm[l]` is the site the `l`-th site is carried onto
fn site_permutation(data: &LatticeMappingSearchData, op: &Operation) -> Option<Permutation> {
    let cart_rotation = op.cartesian_rotation(&data.prim.lattice);
    let cart_translation = op.cartesian_translation(&data.prim.lattice);
    let prim_inverse = data.prim.lattice.inverse();
    let tol = data.prim.lattice.tol;

    let num_sites = data.num_supercell_sites();
    let mut mapping = Vec::with_capacity(num_sites);
    for site in 0..num_sites {
        let image = cart_rotation * data.supercell_site_coordinate_cart[site] + cart_translation;

        let mut found = None;
        for b in 0..data.prim.num_sites() {
            let frac = prim_inverse * (image - data.prim.site_coordinate_cart[b]);
            let cell = frac.map(|e| e.round());
            if (frac - cell).amax() < tol {
                found = Some(
                    data.converter
                        .linear_index(b, &cell.map(|e| e as i32)),
                );
                break;
            }
        }
        mapping.push(found?);
    }

    let permutation = Permutation::new(mapping);
    permutation.is_bijection().then_some(permutation)
}

/// Permutation representation of a child operation on atoms, matching
/// same-type atoms modulo the child lattice
fn atom_permutation(structure: &StructureSearchData, op: &Operation) -> Option<Permutation> {
    let cart_rotation = op.cartesian_rotation(&structure.lattice);
    let cart_translation = op.cartesian_translation(&structure.lattice);
    let inverse = structure.lattice.inverse();
    let tol = structure.lattice.tol;

    let num_atoms = structure.num_atoms();
    let mut mapping = Vec::with_capacity(num_atoms);
    for atom in 0..num_atoms {
        let image = cart_rotation * structure.atom_coordinate_cart[atom] + cart_translation;

        let mut found = None;
        for other in 0..num_atoms {
            if structure.atom_types[other] != structure.atom_types[atom] {
                continue;
            }
            let frac = inverse * (image - structure.atom_coordinate_cart[other]);
            if (frac - frac.map(|e| e.round())).amax() < tol {
                found = Some(other);
                break;
            }
        }
        mapping.push(found?);
    }

    let permutation = Permutation::new(mapping);
    permutation.is_bijection().then_some(permutation)
}

fn matrix_key(m: &Matrix3<i32>) -> [i32; 9] {
    [
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 0)],
        m[(1, 1)],
        m[(1, 2)],
        m[(2, 0)],
        m[(2, 1)],
        m[(2, 2)],
    ]
}

/// Fractional translation reduced into `[0, 1)` on a fixed grid, so that
/// equivalent translations hash identically
fn quantized_fractional(data: &LatticeMappingSearchData, translation: &Vector3<f64>) -> [i64; 3] {
    const GRID: i64 = 1_000_000;
    let frac = data.prim.lattice.fractional_coords(translation);
    let quantize =
        |e: f64| ((e.rem_euclid(1.0) * GRID as f64).round() as i64).rem_euclid(GRID);
    [quantize(frac[0]), quantize(frac[1]), quantize(frac[2])]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nalgebra::{Matrix3, Vector3};

    use crate::base::{
        generate_group, Lattice, Operation, PrimSearchData, StructureSearchData,
        Translation,
    };
    use crate::mapping::atom_cost::{map_atoms, AtomMapOptions};
    use crate::mapping::lattice_mapping::LatticeMapping;
    use crate::mapping::search_data::LatticeMappingSearchData;

    use super::CanonicalizationContext;

    fn cubic_group() -> Vec<Operation> {
        generate_group(&[
            Operation::new(
                nalgebra::matrix![
                    0, -1, 0;
                    1, 0, 0;
                    0, 0, 1;
                ],
                Translation::zeros(),
            ),
            Operation::new(
                nalgebra::matrix![
                    0, 0, 1;
                    1, 0, 0;
                    0, 1, 0;
                ],
                Translation::zeros(),
            ),
            Operation::new(-Matrix3::identity(), Translation::zeros()),
        ])
    }

    fn bcc_data() -> Arc<LatticeMappingSearchData> {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
                vec![vec!["A".to_string(), "B".to_string()]; 2],
                cubic_group(),
            )
            .unwrap(),
        );
        let structure = Arc::new(
            StructureSearchData::new(
                lattice,
                vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
                vec!["A".to_string(), "B".to_string()],
                None,
            )
            .unwrap(),
        );
        let mapping = LatticeMapping::new(
            Matrix3::identity(),
            Matrix3::<i32>::identity(),
            Matrix3::<i32>::identity(),
        )
        .unwrap();
        Arc::new(LatticeMappingSearchData::new(prim, structure, mapping).unwrap())
    }

    #[test]
    fn test_site_representation_is_group_sized() {
        let data = bcc_data();
        let context = CanonicalizationContext::new(&data);
        // Every cubic point operation fixes the volume-one supercell
        assert_eq!(context.num_site_ops(), 48);
        assert_eq!(context.num_atom_ops(), 1);
    }

    #[test]
    fn test_fingerprint_closed_under_symmetry() {
        let data = bcc_data();
        let context = CanonicalizationContext::new(&data);

        let results = map_atoms(&data, &AtomMapOptions::default()).unwrap();
        let mapping = &results[0].mapping;
        let reference = context.fingerprint(&data, mapping);

        for g in 0..context.num_site_ops() {
            for h in 0..context.num_atom_ops() {
                let image = context.transform(&data, g, h, mapping);
                assert_eq!(context.fingerprint(&data, &image), reference);
            }
        }
    }

    #[test]
    fn test_distinct_mappings_fingerprint_differently() {
        let data = bcc_data();
        let context = CanonicalizationContext::new(&data);

        // Swapping the two different species is not a symmetry image
        let results = map_atoms(
            &data,
            &AtomMapOptions {
                k_best: 4,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(results.len() >= 2);
        let first = context.fingerprint(&data, &results[0].mapping);
        let second = context.fingerprint(&data, &results[1].mapping);
        assert_ne!(first, second);
    }
}
