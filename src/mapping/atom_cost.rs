use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::assign::{CostMatrix, MurtyEnumerator, ScoredAssignment};
use crate::base::{is_vacancy, MapError};

use super::search_data::LatticeMappingSearchData;

/// Atom (displacement) cost conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtomCostFunction {
    /// Sum of squared minimum-image displacements
    #[default]
    Isotropic,
    /// Same sum after projecting out the symmetry-invariant displacement
    /// modes of the parent
    SymmetryBreaking,
}

#[derive(Debug, Clone)]
pub struct AtomMapOptions {
    pub cost_function: AtomCostFunction,
    /// Sentinel marking forbidden site-atom pairs in cost matrices
    pub infinity: f64,
    pub max_cost: f64,
    pub k_best: usize,
}

impl Default for AtomMapOptions {
    fn default() -> Self {
        Self {
            cost_function: AtomCostFunction::default(),
            infinity: 1e10,
            max_cost: 1e20,
            k_best: 1,
        }
    }
}

/// An assignment of child atoms (and synthetic vacancies) to supercell sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomMapping {
    /// `displacement[l]` is the minimum-image vector from the assigned,
    /// translated atom to site `l`; zero for vacancies
    pub displacement: Vec<Vector3<f64>>,
    /// `permutation[site] = atom_or_vacancy_index`; indices at or above the
    /// atom count are synthetic vacancies
    pub permutation: Vec<usize>,
    /// Rigid shift applied to all atoms before assignment
    pub translation: Vector3<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAtomMapping {
    pub cost: f64,
    pub mapping: AtomMapping,
}

/// Immutable per-translation record: displacement table and cost matrix for
/// one trial translation of one lattice mapping
#[derive(Debug)]
pub struct AtomMappingSearchData {
    pub lattice_mapping_data: Arc<LatticeMappingSearchData>,
    pub translation: Vector3<f64>,
    /// `displacement[l][j]`: minimum image from translated atom `j` to site `l`
    pub displacement: Vec<Vec<Vector3<f64>>>,
    pub cost_matrix: CostMatrix,
}

impl AtomMappingSearchData {
    /// Build the cost matrix for one trial translation. Columns past the
    /// atom count are synthetic vacancies.
    ///
    /// Fails with `InfeasibleAssignment` when some atom is allowed on no
    /// site at all.
    pub fn new(
        lattice_mapping_data: Arc<LatticeMappingSearchData>,
        translation: Vector3<f64>,
        infinity: f64,
    ) -> Result<Self, MapError> {
        let data = &lattice_mapping_data;
        let num_sites = data.num_supercell_sites();
        let num_atoms = data.structure.num_atoms();

        let mut displacement = Vec::with_capacity(num_sites);
        for site in 0..num_sites {
            let site_coord = data.supercell_site_coordinate_cart[site];
            let mut row = Vec::with_capacity(num_atoms);
            for atom in 0..num_atoms {
                let shifted =
                    data.atom_coordinate_cart_in_supercell[atom] + translation;
                row.push(data.wigner_seitz.reduce(&(site_coord - shifted))?);
            }
            displacement.push(row);
        }

        let mut entries = Vec::with_capacity(num_sites * num_sites);
        for site in 0..num_sites {
            for col in 0..num_sites {
                entries.push(pair_cost(data, &displacement, site, col, infinity));
            }
        }

        // Reject early if an atom cannot sit anywhere
        for atom in 0..num_atoms {
            if (0..num_sites).all(|site| entries[site * num_sites + atom] >= infinity) {
                return Err(MapError::InfeasibleAssignment);
            }
        }

        let cost_matrix = CostMatrix::new(num_sites, entries, infinity)?;
        Ok(Self {
            lattice_mapping_data,
            translation,
            displacement,
            cost_matrix,
        })
    }

    /// Assemble the atom mapping selected by a solved assignment
    pub fn atom_mapping(&self, solution: &ScoredAssignment) -> ScoredAtomMapping {
        let data = &self.lattice_mapping_data;
        let num_atoms = data.structure.num_atoms();
        let displacement = solution
            .assignment
            .iter()
            .enumerate()
            .map(|(site, &col)| {
                if col < num_atoms && !is_vacancy(&data.structure.atom_types[col]) {
                    self.displacement[site][col]
                } else {
                    Vector3::zeros()
                }
            })
            .collect();
        ScoredAtomMapping {
            cost: solution.cost,
            mapping: AtomMapping {
                displacement,
                permutation: solution.assignment.clone(),
                translation: self.translation,
            },
        }
    }
}

/// Atom mapping cost of placing column `col` on `site`: zero for admissible
/// vacancies, squared displacement for admissible atoms, infinity otherwise
fn pair_cost(
    data: &LatticeMappingSearchData,
    displacement: &[Vec<Vector3<f64>>],
    site: usize,
    col: usize,
    infinity: f64,
) -> f64 {
    let num_atoms = data.structure.num_atoms();
    let atom_type: &str = if col < num_atoms {
        &data.structure.atom_types[col]
    } else {
        "Va"
    };

    if is_vacancy(atom_type) {
        if data.site_allows(site, "Va") {
            0.0
        } else {
            infinity
        }
    } else if !data.site_allows(site, atom_type) {
        infinity
    } else {
        displacement[site][col].norm_squared()
    }
}

/// Candidate rigid translations bringing atoms into registry with sites.
///
/// The pivot atom is the one with the fewest admissible sublattices (lowest
/// index on ties); one candidate per admissible sublattice, reduced modulo
/// the parent's internal translations and lattice vectors.
pub fn trial_translations(
    data: &LatticeMappingSearchData,
) -> Result<Vec<Vector3<f64>>, MapError> {
    let prim = &data.prim;

    let mut pivot: Option<(usize, usize)> = None;
    for (atom, atom_type) in data.structure.atom_types.iter().enumerate() {
        let count = (0..prim.num_sites())
            .filter(|&b| prim.site_allows(b, atom_type))
            .count();
        if count == 0 {
            return Err(MapError::InfeasibleAssignment);
        }
        if pivot.is_none_or(|(best_count, _)| count < best_count) {
            pivot = Some((count, atom));
        }
    }
    let (_, pivot) = pivot.ok_or(MapError::InvalidInput)?;
    let pivot_coord = data.atom_coordinate_cart_in_supercell[pivot];
    let pivot_type = &data.structure.atom_types[pivot];

    let prim_inverse = prim.lattice.inverse();
    let tol = prim.lattice.tol;
    let mut translations: Vec<Vector3<f64>> = vec![];
    for b in 0..prim.num_sites() {
        if !prim.site_allows(b, pivot_type) {
            continue;
        }
        let candidate = prim.site_coordinate_cart[b] - pivot_coord;

        let duplicate = translations.iter().any(|accepted| {
            prim.internal_translations_cart.iter().any(|internal| {
                let frac = prim_inverse * (candidate + internal - accepted);
                (frac - frac.map(|e| e.round())).amax() < tol
            })
        });
        if !duplicate {
            translations.push(candidate);
        }
    }

    Ok(translations)
}

/// Total displacement cost after removing the projection onto the parent's
/// symmetry-invariant displacement modes.
///
/// The modes are taken as an orthogonal basis of the invariant subspace,
/// tiled periodically over the supercell.
pub fn symmetry_breaking_atom_cost(
    data: &LatticeMappingSearchData,
    mapping: &AtomMapping,
) -> Result<f64, MapError> {
    let modes = data
        .prim
        .sym_invariant_displacement_modes
        .as_ref()
        .ok_or(MapError::InvalidInput)?;

    let num_sites = data.num_supercell_sites();
    let mut field = mapping.displacement.clone();
    if field.len() != num_sites {
        return Err(MapError::InvalidInput);
    }

    for mode in modes.iter() {
        if mode.len() != data.prim.num_sites() {
            return Err(MapError::InvalidInput);
        }
        let tiled: Vec<Vector3<f64>> = (0..num_sites)
            .map(|l| mode[data.converter.sublattice(l)])
            .collect();
        let norm_squared: f64 = tiled.iter().map(|v| v.norm_squared()).sum();
        if norm_squared < crate::base::EPS {
            continue;
        }
        let coefficient: f64 = field
            .iter()
            .zip(tiled.iter())
            .map(|(d, m)| d.dot(m))
            .sum::<f64>()
            / norm_squared;
        for (d, m) in field.iter_mut().zip(tiled.iter()) {
            *d -= m * coefficient;
        }
    }

    Ok(field.iter().map(|d| d.norm_squared()).sum())
}

/// Enumerate the cheapest atom mappings of one lattice mapping, across all
/// trial translations
pub fn map_atoms(
    data: &Arc<LatticeMappingSearchData>,
    options: &AtomMapOptions,
) -> Result<Vec<ScoredAtomMapping>, MapError> {
    let translations = trial_translations(data)?;
    let tol = data.prim.lattice.tol;

    let mut results: Vec<ScoredAtomMapping> = vec![];
    for translation in translations {
        let search_data =
            AtomMappingSearchData::new(Arc::clone(data), translation, options.infinity)?;
        let mut enumerator = match MurtyEnumerator::new(
            search_data.cost_matrix.clone(),
            tol,
            options.max_cost,
        ) {
            Ok(enumerator) => enumerator,
            Err(MapError::NoAssignmentsUnderBound) => continue,
            Err(e) => return Err(e),
        };

        let mut taken = 0;
        while taken < options.k_best {
            let Some(solution) = enumerator.next_assignment() else {
                break;
            };
            let mut scored = search_data.atom_mapping(&solution);
            if options.cost_function == AtomCostFunction::SymmetryBreaking {
                scored.cost = symmetry_breaking_atom_cost(data, &scored.mapping)?;
            }
            results.push(scored);
            taken += 1;
        }
    }

    results.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    results.truncate(options.k_best);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nalgebra::{Matrix3, Vector3};

    use crate::base::{
        Lattice, MapError, Operation, PrimSearchData, StructureSearchData,
    };
    use crate::mapping::lattice_mapping::LatticeMapping;
    use crate::mapping::search_data::LatticeMappingSearchData;

    use super::{
        map_atoms, symmetry_breaking_atom_cost, trial_translations, AtomMapOptions,
        AtomMappingSearchData,
    };

    fn identity_mapping() -> LatticeMapping {
        LatticeMapping::new(
            Matrix3::identity(),
            Matrix3::<i32>::identity(),
            Matrix3::<i32>::identity(),
        )
        .unwrap()
    }

    fn conventional_fcc_prim() -> Arc<PrimSearchData> {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let positions = vec![
            Vector3::zeros(),
            Vector3::new(0.0, 0.5, 0.5),
            Vector3::new(0.5, 0.0, 0.5),
            Vector3::new(0.5, 0.5, 0.0),
        ];
        let factor_group = positions
            .iter()
            .map(|t| Operation::new(Matrix3::identity(), *t))
            .collect();
        Arc::new(
            PrimSearchData::new(
                lattice,
                positions,
                vec![vec!["A".to_string()]; 4],
                factor_group,
            )
            .unwrap(),
        )
    }

    fn search_data(
        prim: Arc<PrimSearchData>,
        structure: StructureSearchData,
    ) -> Arc<LatticeMappingSearchData> {
        Arc::new(
            LatticeMappingSearchData::new(prim, Arc::new(structure), identity_mapping())
                .unwrap(),
        )
    }

    #[test]
    fn test_trial_translations_reduced_by_internal_translations() {
        let prim = conventional_fcc_prim();
        let structure = StructureSearchData::new(
            prim.lattice.clone(),
            vec![
                Vector3::zeros(),
                Vector3::new(0.0, 0.5, 0.5),
                Vector3::new(0.5, 0.0, 0.5),
                Vector3::new(0.5, 0.5, 0.0),
            ],
            vec!["A".to_string(); 4],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        // The four face-centering candidates collapse onto one orbit
        let translations = trial_translations(&data).unwrap();
        assert_eq!(translations.len(), 1);
        assert_relative_eq!(translations[0], Vector3::zeros());
    }

    #[test]
    fn test_trial_translations_without_internal_translations() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
                vec![vec!["A".to_string()]; 2],
                vec![],
            )
            .unwrap(),
        );
        let structure = StructureSearchData::new(
            lattice,
            vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
            vec!["A".to_string(); 2],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        let translations = trial_translations(&data).unwrap();
        assert_eq!(translations.len(), 2);
    }

    #[test]
    fn test_unmappable_atom_type() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros()],
                vec![vec!["A".to_string()]],
                vec![],
            )
            .unwrap(),
        );
        let structure = StructureSearchData::new(
            lattice,
            vec![Vector3::zeros()],
            vec!["B".to_string()],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        assert_eq!(
            trial_translations(&data).unwrap_err(),
            MapError::InfeasibleAssignment
        );
    }

    #[test]
    fn test_vacancy_padding_in_cost_matrix() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
                vec![vec!["A".to_string(), "Va".to_string()]; 2],
                vec![],
            )
            .unwrap(),
        );
        let structure = StructureSearchData::new(
            lattice,
            vec![Vector3::zeros()],
            vec!["A".to_string()],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        let search = AtomMappingSearchData::new(Arc::clone(&data), Vector3::zeros(), 1e10)
            .unwrap();
        let matrix = &search.cost_matrix;
        assert_eq!(matrix.n(), 2);
        // Column 0 is the atom, column 1 the synthetic vacancy
        assert_relative_eq!(matrix.get(0, 0), 0.0);
        assert_relative_eq!(matrix.get(1, 0), 0.75);
        assert_relative_eq!(matrix.get(0, 1), 0.0);
        assert_relative_eq!(matrix.get(1, 1), 0.0);
    }

    #[test]
    fn test_map_atoms_prefers_vacancy_on_empty_site() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros(), Vector3::new(0.5, 0.5, 0.5)],
                vec![vec!["A".to_string(), "Va".to_string()]; 2],
                vec![],
            )
            .unwrap(),
        );
        let structure = StructureSearchData::new(
            lattice,
            vec![Vector3::zeros()],
            vec!["A".to_string()],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        let results = map_atoms(&data, &AtomMapOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        let best = &results[0];
        assert_relative_eq!(best.cost, 0.0);
        assert_eq!(best.mapping.permutation, vec![0, 1]);
        assert_relative_eq!(best.mapping.displacement[1], Vector3::zeros());
    }

    #[test]
    fn test_symmetry_breaking_cost_ignores_uniform_shift() {
        let lattice = Lattice::from_basis(Matrix3::identity()).unwrap();
        let prim = Arc::new(
            PrimSearchData::new(
                lattice.clone(),
                vec![Vector3::zeros()],
                vec![vec!["A".to_string()]],
                vec![],
            )
            .unwrap()
            .with_displacement_modes(vec![
                vec![Vector3::new(1.0, 0.0, 0.0)],
                vec![Vector3::new(0.0, 1.0, 0.0)],
                vec![Vector3::new(0.0, 0.0, 1.0)],
            ]),
        );
        let structure = StructureSearchData::new(
            lattice,
            vec![Vector3::new(0.05, 0.0, 0.0)],
            vec!["A".to_string()],
            None,
        )
        .unwrap();
        let data = search_data(prim, structure);

        let results = map_atoms(&data, &AtomMapOptions::default()).unwrap();
        let best = &results[0];
        // A rigid shift costs isotropically but is entirely symmetry preserving
        assert!(best.cost > 0.0 || best.mapping.displacement[0].norm() < 1e-12);
        let breaking = symmetry_breaking_atom_cost(&data, &best.mapping).unwrap();
        assert_relative_eq!(breaking, 0.0, epsilon = 1e-12);
    }
}
