use std::cmp::Ordering;
use std::collections::BinaryHeap;

use itertools::Itertools;
use log::debug;
use nalgebra::Matrix3;

use crate::base::{
    linear_as_f64, linear_determinant, unimodular_inverse, Lattice, Linear, MapError,
    Operations, UnimodularLinear, EPS,
};
use crate::math::hnf;
use crate::math::hnf_matrices_of_determinant;

use super::lattice_mapping::{LatticeMapping, ScoredLatticeMapping};
use super::strain::{lattice_cost, LatticeCostFunction};

#[derive(Debug, Clone)]
pub struct LatticeMapOptions {
    /// Smallest supercell volume (in units of the parent cell) to consider
    pub min_vol: i32,
    /// Largest supercell volume to consider
    pub max_vol: i32,
    /// Strain-cost ceiling
    pub max_cost: f64,
    /// Stop after the `k` cheapest mappings when set
    pub k_best: Option<usize>,
    /// Entry bound of the unimodular perturbations tried during the
    /// reorientation search
    pub reorientation_range: i32,
    pub cost_function: LatticeCostFunction,
}

impl Default for LatticeMapOptions {
    fn default() -> Self {
        Self {
            min_vol: 1,
            max_vol: 1,
            max_cost: 1e20,
            k_best: None,
            reorientation_range: 1,
            cost_function: LatticeCostFunction::default(),
        }
    }
}

enum PendingItem {
    /// A volume whose supercells have not been scored yet; its key is a
    /// lower bound on every mapping the volume can produce
    Volume(i32),
    /// A scored mapping waiting for emission; its key is its cost
    Ready(ScoredLatticeMapping),
}

struct Pending {
    key: f64,
    /// Volumes sort before ready mappings of equal key, so nothing is
    /// emitted while a cheaper candidate may still be unscored
    rank: u8,
    seq: u64,
    item: PendingItem,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we pop the cheapest first
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.rank.cmp(&self.rank))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Lazy, cost-bounded enumeration of lattice mappings from a parent lattice
/// onto a child lattice, emitted in ascending strain-cost order.
///
/// Each volume is held back behind a lower bound on its achievable cost and
/// its supercells are scored only once that bound reaches the head of the
/// queue, so volumes the caller never consumes are never searched.
pub struct LatticeMappingEnumerator {
    prim_lattice: Lattice,
    child_lattice: Lattice,
    prim_rotations: Vec<Matrix3<i32>>,
    cart_rotations: Vec<Matrix3<f64>>,
    reduction_to_child: UnimodularLinear,
    unimodular_pool: Vec<UnimodularLinear>,
    max_cost: f64,
    cost_function: LatticeCostFunction,
    pending: BinaryHeap<Pending>,
    remaining: Option<usize>,
    seq: u64,
}

impl LatticeMappingEnumerator {
    pub fn new(
        prim_lattice: &Lattice,
        child_lattice: &Lattice,
        prim_factor_group: &Operations,
        options: &LatticeMapOptions,
    ) -> Result<Self, MapError> {
        if options.min_vol < 1
            || options.max_vol < options.min_vol
            || options.max_cost < 0.0
            || options.reorientation_range < 1
        {
            return Err(MapError::InvalidInput);
        }

        let prim_rotations: Vec<Matrix3<i32>> = prim_factor_group
            .iter()
            .map(|op| op.rotation)
            .unique()
            .collect();
        let cart_rotations: Vec<Matrix3<f64>> = prim_factor_group
            .iter()
            .map(|op| op.cartesian_rotation(prim_lattice))
            .collect();

        let (_, reduction_to_child) = child_lattice.minkowski_reduce()?;

        let mut enumerator = Self {
            prim_lattice: prim_lattice.clone(),
            child_lattice: child_lattice.clone(),
            prim_rotations,
            cart_rotations,
            reduction_to_child,
            unimodular_pool: unimodular_matrices(options.reorientation_range),
            max_cost: options.max_cost,
            cost_function: options.cost_function,
            pending: BinaryHeap::new(),
            remaining: options.k_best,
            seq: 0,
        };
        for volume in options.min_vol..=options.max_vol {
            let bound = enumerator.volume_lower_bound(volume);
            if bound <= enumerator.max_cost + EPS {
                enumerator.push(bound, PendingItem::Volume(volume));
            } else {
                debug!("volume {}: lower bound {} above ceiling, dropped", volume, bound);
            }
        }
        Ok(enumerator)
    }

    /// Cheapest cost any mapping of this volume can achieve: the stretch is
    /// constrained to `det U = vol(child) / (volume * vol(parent))`, and the
    /// constrained minimum of the isotropic cost is the pure dilation
    fn volume_lower_bound(&self, volume: i32) -> f64 {
        match self.cost_function {
            LatticeCostFunction::Isotropic => {
                let ratio =
                    self.child_lattice.volume() / (volume as f64 * self.prim_lattice.volume());
                (ratio.cbrt() - 1.0).powi(2)
            }
            // A pure dilation is entirely symmetry preserving
            LatticeCostFunction::SymmetryBreaking => 0.0,
        }
    }

    fn push(&mut self, key: f64, item: PendingItem) {
        let rank = match item {
            PendingItem::Volume(_) => 0,
            PendingItem::Ready(_) => 1,
        };
        self.pending.push(Pending {
            key,
            rank,
            seq: self.seq,
            item,
        });
        self.seq += 1;
    }

    /// Score every orbit-representative supercell of one volume and queue
    /// the surviving mappings
    fn score_volume(&mut self, volume: i32) -> Result<(), MapError> {
        let all = hnf_matrices_of_determinant(volume);
        let representatives: Vec<Linear> = all
            .iter()
            .filter(|t| is_canonical_sublattice(t, &self.prim_rotations))
            .copied()
            .collect();
        debug!(
            "volume {}: {} supercells, {} orbit representatives",
            volume,
            all.len(),
            representatives.len()
        );

        for transformation in representatives {
            let superlattice = self.prim_lattice.superlattice(&transformation)?;
            let (_, reduction_to_sup) = superlattice.minkowski_reduce()?;

            if let Some((cost, mapping)) = best_reorientation(
                &superlattice,
                &self.child_lattice,
                &transformation,
                &reduction_to_sup,
                &self.reduction_to_child,
                &self.unimodular_pool,
                self.cost_function,
                &self.cart_rotations,
            )? {
                if cost <= self.max_cost + EPS {
                    self.push(cost, PendingItem::Ready(ScoredLatticeMapping { cost, mapping }));
                }
            }
        }

        Ok(())
    }
}

impl Iterator for LatticeMappingEnumerator {
    type Item = Result<ScoredLatticeMapping, MapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let pending = self.pending.pop()?;
            match pending.item {
                PendingItem::Volume(volume) => {
                    if let Err(e) = self.score_volume(volume) {
                        self.pending.clear();
                        return Some(Err(e));
                    }
                }
                PendingItem::Ready(mapping) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(mapping));
                }
            }
        }
    }
}

/// Keep one Hermite-normal-form representative per orbit of sublattices
/// under the parent point group: the lexicographically smallest image
fn is_canonical_sublattice(transformation: &Linear, prim_rotations: &[Matrix3<i32>]) -> bool {
    let own = lex_matrix_key(transformation);
    for rotation in prim_rotations.iter() {
        let image = hnf(&(rotation * transformation));
        if lex_matrix_key(&image) < own {
            return false;
        }
    }
    true
}

/// Search the bounded unimodular pool for the reorientation minimizing the
/// strain cost of `F = L_child * (L_sup * N)^-1`
#[allow(clippy::too_many_arguments)]
fn best_reorientation(
    superlattice: &Lattice,
    child_lattice: &Lattice,
    transformation: &Linear,
    reduction_to_sup: &UnimodularLinear,
    reduction_to_child: &UnimodularLinear,
    unimodular_pool: &[UnimodularLinear],
    cost_function: LatticeCostFunction,
    cart_rotations: &[Matrix3<f64>],
) -> Result<Option<(f64, LatticeMapping)>, MapError> {
    let child_from_reduced =
        unimodular_inverse(reduction_to_child).ok_or(MapError::InvalidInput)?;

    let mut best: Option<(f64, LatticeMapping)> = None;
    for w in unimodular_pool.iter() {
        let reorientation = reduction_to_sup * w * child_from_reduced;
        let mapped_basis = superlattice.basis * linear_as_f64(&reorientation);
        let Some(inverse) = mapped_basis.try_inverse() else {
            continue;
        };
        let deformation_gradient = child_lattice.basis * inverse;
        if deformation_gradient.determinant() <= EPS {
            continue;
        }

        let cost = lattice_cost(&deformation_gradient, cost_function, cart_rotations);
        if best.as_ref().is_none_or(|(best_cost, _)| cost + EPS < *best_cost) {
            let mapping =
                LatticeMapping::new(deformation_gradient, *transformation, reorientation)?;
            best = Some((cost, mapping));
        }
    }
    Ok(best)
}

/// All integer matrices with entries in `[-range, range]` and determinant ±1
fn unimodular_matrices(range: i32) -> Vec<UnimodularLinear> {
    (0..9)
        .map(|_| -range..=range)
        .multi_cartesian_product()
        .filter_map(|entries| {
            let m = Matrix3::from_row_slice(&entries);
            (linear_determinant(&m).abs() == 1).then_some(m)
        })
        .collect()
}

fn lex_matrix_key(m: &Matrix3<i32>) -> [i32; 9] {
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
