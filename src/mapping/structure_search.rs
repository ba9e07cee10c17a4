use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashSet;
use std::iter::Peekable;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::assign::MurtyEnumerator;
use crate::base::{MapError, PrimSearchData, StructureSearchData, EPS};

use super::atom_cost::{
    symmetry_breaking_atom_cost, trial_translations, AtomCostFunction, AtomMapping,
    AtomMappingSearchData, ScoredAtomMapping,
};
use super::canonical::{CanonicalizationContext, Fingerprint};
use super::lattice_mapping::LatticeMapping;
use super::lattice_search::{LatticeMapOptions, LatticeMappingEnumerator};
use super::search_data::LatticeMappingSearchData;
use super::strain::LatticeCostFunction;

#[derive(Debug, Clone)]
pub struct StructureMapOptions {
    /// Weight of the lattice cost in the combined score
    pub lattice_weight: f64,
    /// Weight of the atom cost in the combined score
    pub atom_weight: f64,
    pub max_lattice_cost: f64,
    pub max_atom_cost: f64,
    pub max_total_cost: f64,
    /// Target number of canonical mappings; ties at the tail are kept
    pub k_best: usize,
    /// Supercell volume range; derived from the atom count when absent
    pub min_vol: Option<i32>,
    pub max_vol: Option<i32>,
    pub reorientation_range: i32,
    pub lattice_cost_function: LatticeCostFunction,
    pub atom_cost_function: AtomCostFunction,
    /// Sentinel for forbidden assignment-matrix entries
    pub infinity: f64,
    /// Bound on queue pops before giving up
    pub max_iterations: usize,
    /// Scores within this tolerance count as tied
    pub cost_tol: f64,
}

impl Default for StructureMapOptions {
    fn default() -> Self {
        Self {
            lattice_weight: 0.5,
            atom_weight: 0.5,
            max_lattice_cost: 1e20,
            max_atom_cost: 1e20,
            max_total_cost: 1e20,
            k_best: 1,
            min_vol: None,
            max_vol: None,
            reorientation_range: 1,
            lattice_cost_function: LatticeCostFunction::default(),
            atom_cost_function: AtomCostFunction::default(),
            infinity: 1e10,
            max_iterations: 1_000_000,
            cost_tol: 1e-5,
        }
    }
}

/// A complete mapping: how the child lattice deforms onto a superlattice of
/// the parent, and which atom occupies which site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureMapping {
    pub lattice_mapping: LatticeMapping,
    pub atom_mapping: AtomMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredStructureMapping {
    pub lattice_cost: f64,
    pub atom_cost: f64,
    pub total_cost: f64,
    pub mapping: StructureMapping,
}

/// Ordered result set of a structure-mapping search
#[derive(Debug)]
pub struct StructureMappingResults {
    /// Canonical mappings in non-decreasing total cost order
    pub mappings: Vec<ScoredStructureMapping>,
    /// True when enumeration stopped at a cost ceiling, the iteration bound,
    /// or `k_best` rather than exhausting the queue
    pub truncated: bool,
}

enum EntryKind {
    /// The lattice enumerator's next mapping, scored by its lattice cost
    /// alone as a lower bound
    LatticeFrontier,
    /// A complete candidate waiting for canonicalization
    Full {
        stream: usize,
        scored: ScoredAtomMapping,
    },
}

struct Entry {
    score: f64,
    seq: u64,
    kind: EntryKind,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we pop the cheapest first
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One Murty stream: the per-translation search data and its enumerator
struct AssignmentStream {
    lattice: usize,
    search_data: Arc<AtomMappingSearchData>,
    enumerator: MurtyEnumerator,
}

/// One expanded lattice mapping shared by its streams
struct ExpandedLattice {
    data: Arc<LatticeMappingSearchData>,
    context: CanonicalizationContext,
    lattice_cost: f64,
}

/// Best-first search over (lattice mapping, trial translation, assignment)
/// emitting canonical structure mappings in non-decreasing combined score
pub fn map_structures(
    prim: Arc<PrimSearchData>,
    structure: Arc<StructureSearchData>,
    options: &StructureMapOptions,
) -> Result<StructureMappingResults, MapError> {
    if options.lattice_weight < 0.0
        || options.atom_weight < 0.0
        || options.k_best == 0
        || options.cost_tol < 0.0
    {
        return Err(MapError::InvalidInput);
    }
    let (min_vol, max_vol) = volume_range(&prim, &structure, options)?;

    let lattice_options = LatticeMapOptions {
        min_vol,
        max_vol,
        max_cost: options.max_lattice_cost,
        k_best: None,
        reorientation_range: options.reorientation_range,
        cost_function: options.lattice_cost_function,
    };
    let mut lattice_iter = LatticeMappingEnumerator::new(
        &prim.lattice,
        &structure.lattice,
        &prim.factor_group,
        &lattice_options,
    )?
    .peekable();

    let mut heap = BinaryHeap::new();
    let mut seq: u64 = 0;

    if let Some(score) = frontier_score(&mut lattice_iter, options)? {
        push_entry(&mut heap, &mut seq, score, EntryKind::LatticeFrontier);
    }

    let mut expanded: Vec<ExpandedLattice> = vec![];
    let mut streams: Vec<AssignmentStream> = vec![];
    let mut results: Vec<ScoredStructureMapping> = vec![];
    let mut fingerprints: HashSet<Fingerprint> = HashSet::new();
    let mut truncated = false;
    let mut iterations = 0;

    while let Some(entry) = heap.pop() {
        iterations += 1;
        if iterations > options.max_iterations {
            truncated = true;
            break;
        }
        if entry.score > options.max_total_cost + EPS {
            truncated = true;
            break;
        }
        if results.len() >= options.k_best {
            let worst = results
                .iter()
                .map(|r| r.total_cost)
                .fold(f64::NEG_INFINITY, f64::max);
            if entry.score > worst + options.cost_tol {
                truncated = true;
                break;
            }
        }

        match entry.kind {
            EntryKind::LatticeFrontier => {
                let scored = lattice_iter.next().unwrap()?;
                if let Some(score) = frontier_score(&mut lattice_iter, options)? {
                    push_entry(&mut heap, &mut seq, score, EntryKind::LatticeFrontier);
                }

                expand_lattice_mapping(
                    &prim,
                    &structure,
                    scored,
                    options,
                    &mut expanded,
                    &mut streams,
                    |score, kind| push_entry(&mut heap, &mut seq, score, kind),
                )?;
            }
            EntryKind::Full { stream, scored } => {
                // Refill from the originating enumerator before recording
                let lattice = streams[stream].lattice;
                if let Some((score, kind)) = next_candidate(
                    &mut streams[stream],
                    stream,
                    &expanded[lattice],
                    options,
                )? {
                    push_entry(&mut heap, &mut seq, score, kind);
                }

                let exp = &expanded[lattice];
                let fingerprint = exp.context.fingerprint(&exp.data, &scored.mapping);
                if fingerprints.insert(fingerprint) {
                    results.push(ScoredStructureMapping {
                        lattice_cost: exp.lattice_cost,
                        atom_cost: scored.cost,
                        total_cost: entry.score,
                        mapping: StructureMapping {
                            lattice_mapping: exp.data.lattice_mapping.clone(),
                            atom_mapping: scored.mapping,
                        },
                    });
                } else {
                    debug!("candidate is equivalent to an earlier mapping");
                }
            }
        }
    }

    results.sort_by(|a, b| a.total_cost.total_cmp(&b.total_cost));
    Ok(StructureMappingResults {
        mappings: results,
        truncated,
    })
}

fn push_entry(heap: &mut BinaryHeap<Entry>, seq: &mut u64, score: f64, kind: EntryKind) {
    heap.push(Entry {
        score,
        seq: *seq,
        kind,
    });
    *seq += 1;
}

/// Lower-bound score of the lattice enumerator's next emission, surfacing
/// enumeration errors eagerly
fn frontier_score(
    lattice_iter: &mut Peekable<LatticeMappingEnumerator>,
    options: &StructureMapOptions,
) -> Result<Option<f64>, MapError> {
    match lattice_iter.peek() {
        None => Ok(None),
        Some(Ok(head)) => Ok(Some(options.lattice_weight * head.cost)),
        Some(Err(e)) => Err(*e),
    }
}

/// Supercell volume range compatible with the atom count; without vacancies
/// the count must tile the parent exactly
fn volume_range(
    prim: &PrimSearchData,
    structure: &StructureSearchData,
    options: &StructureMapOptions,
) -> Result<(i32, i32), MapError> {
    let sites = prim.num_sites();
    let atoms = structure.num_atoms();
    let derived_min = atoms.div_ceil(sites).max(1) as i32;

    if !prim.vacancies_allowed {
        if atoms % sites != 0 {
            return Err(MapError::InvalidInput);
        }
        let vol = (atoms / sites) as i32;
        return Ok((vol, vol));
    }

    let min_vol = options.min_vol.unwrap_or(derived_min).max(derived_min);
    let max_vol = options.max_vol.unwrap_or(min_vol).max(min_vol);
    Ok((min_vol, max_vol))
}

/// Build the shared search data of a popped lattice mapping and push the
/// first emission of every feasible translation stream.
/// Infeasible translation streams are skipped; the whole lattice mapping is
/// skipped when no atom can be placed at all.
fn expand_lattice_mapping(
    prim: &Arc<PrimSearchData>,
    structure: &Arc<StructureSearchData>,
    scored: super::lattice_mapping::ScoredLatticeMapping,
    options: &StructureMapOptions,
    expanded: &mut Vec<ExpandedLattice>,
    streams: &mut Vec<AssignmentStream>,
    mut push: impl FnMut(f64, EntryKind),
) -> Result<(), MapError> {
    let data = match LatticeMappingSearchData::new(
        Arc::clone(prim),
        Arc::clone(structure),
        scored.mapping,
    ) {
        Ok(data) => Arc::new(data),
        Err(MapError::InvalidInput) => {
            debug!("lattice mapping incompatible with atom count, skipped");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let translations = match trial_translations(&data) {
        Ok(translations) => translations,
        Err(MapError::InfeasibleAssignment) => {
            debug!("no admissible site for some atom, lattice mapping skipped");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let context = CanonicalizationContext::new(&data);
    let lattice_index = expanded.len();
    expanded.push(ExpandedLattice {
        data: Arc::clone(&data),
        context,
        lattice_cost: scored.cost,
    });

    for translation in translations {
        let search_data = match AtomMappingSearchData::new(
            Arc::clone(&data),
            translation,
            options.infinity,
        ) {
            Ok(search_data) => Arc::new(search_data),
            Err(MapError::InfeasibleAssignment) => {
                debug!("translation admits no finite assignment, skipped");
                continue;
            }
            Err(e) => return Err(e),
        };

        let enumerator = match MurtyEnumerator::new(
            search_data.cost_matrix.clone(),
            prim.lattice.tol,
            options.max_atom_cost,
        ) {
            Ok(enumerator) => enumerator,
            Err(MapError::NoAssignmentsUnderBound) => {
                debug!("best assignment above the atom-cost ceiling, skipped");
                continue;
            }
            Err(e) => return Err(e),
        };

        let stream_index = streams.len();
        streams.push(AssignmentStream {
            lattice: lattice_index,
            search_data,
            enumerator,
        });
        if let Some((score, kind)) = next_candidate(
            &mut streams[stream_index],
            stream_index,
            &expanded[lattice_index],
            options,
        )? {
            push(score, kind);
        }
    }

    Ok(())
}

/// Pull the next assignment from a stream and wrap it as a queue entry
fn next_candidate(
    stream: &mut AssignmentStream,
    stream_index: usize,
    expanded: &ExpandedLattice,
    options: &StructureMapOptions,
) -> Result<Option<(f64, EntryKind)>, MapError> {
    let Some(solution) = stream.enumerator.next_assignment() else {
        return Ok(None);
    };
    let mut scored = stream.search_data.atom_mapping(&solution);
    if options.atom_cost_function == AtomCostFunction::SymmetryBreaking {
        scored.cost = symmetry_breaking_atom_cost(&expanded.data, &scored.mapping)?;
    }

    let score =
        options.lattice_weight * expanded.lattice_cost + options.atom_weight * scored.cost;
    Ok(Some((
        score,
        EntryKind::Full {
            stream: stream_index,
            scored,
        },
    )))
}
