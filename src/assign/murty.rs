use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::base::MapError;

use super::hungarian::{solve_assignment, CostMatrix, ScoredAssignment};

/// Sub-problem in the partition tree: pairs that must be selected and pairs
/// that must not be
#[derive(Debug, Clone)]
struct Node {
    forced: Vec<(usize, usize)>,
    forbidden: Vec<(usize, usize)>,
}

#[derive(Debug)]
struct Candidate {
    solution: ScoredAssignment,
    node: Node,
    /// Insertion sequence number, to make heap ordering total
    seq: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we pop the cheapest first
        other
            .solution
            .cost
            .total_cmp(&self.solution.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Enumerate assignments in ascending cost order by Murty's partitioning
/// of the solution space over an optimal solver.
#[derive(Debug)]
pub struct MurtyEnumerator {
    matrix: CostMatrix,
    tol: f64,
    max_cost: f64,
    queue: BinaryHeap<Candidate>,
    next_seq: u64,
}

impl MurtyEnumerator {
    /// Solve the unconstrained root problem and seed the partition tree.
    ///
    /// Fails with `NoAssignmentsUnderBound` when the root is infeasible or
    /// its optimum already exceeds `max_cost`.
    pub fn new(matrix: CostMatrix, tol: f64, max_cost: f64) -> Result<Self, MapError> {
        let root = Node {
            forced: vec![],
            forbidden: vec![],
        };
        let solution = solve_assignment(&matrix, tol)
            .map_err(|_| MapError::NoAssignmentsUnderBound)?;
        if solution.cost > max_cost {
            return Err(MapError::NoAssignmentsUnderBound);
        }

        let mut queue = BinaryHeap::new();
        queue.push(Candidate {
            solution,
            node: root,
            seq: 0,
        });
        Ok(Self {
            matrix,
            tol,
            max_cost,
            queue,
            next_seq: 1,
        })
    }

    /// Return the next-cheapest assignment.
    /// Emitted costs are monotone non-decreasing and no assignment repeats.
    pub fn next_assignment(&mut self) -> Option<ScoredAssignment> {
        let popped = self.queue.pop()?;
        self.partition(&popped);
        Some(popped.solution)
    }

    /// Split the popped sub-problem: the `i`-th child forbids the popped
    /// solution's `i`-th free pair and forces all earlier free pairs, so the
    /// children cover the remaining solutions disjointly.
    fn partition(&mut self, popped: &Candidate) {
        let forced_rows: Vec<usize> = popped.node.forced.iter().map(|&(r, _)| r).collect();
        let mut forced_prefix = popped.node.forced.clone();

        for row in 0..self.matrix.n() {
            if forced_rows.contains(&row) {
                continue;
            }
            let col = popped.solution.assignment[row];

            let mut child = Node {
                forced: forced_prefix.clone(),
                forbidden: popped.node.forbidden.clone(),
            };
            child.forbidden.push((row, col));

            if let Some(solution) = self.solve_node(&child) {
                self.queue.push(Candidate {
                    solution,
                    node: child,
                    seq: self.next_seq,
                });
                self.next_seq += 1;
            }

            forced_prefix.push((row, col));
        }
    }

    fn solve_node(&self, node: &Node) -> Option<ScoredAssignment> {
        let mut restricted = self.matrix.clone();
        for &(row, col) in node.forced.iter() {
            restricted.force(row, col);
        }
        for &(row, col) in node.forbidden.iter() {
            restricted.forbid(row, col);
        }

        let solution = solve_assignment(&restricted, self.tol).ok()?;
        if solution.cost > self.max_cost {
            return None;
        }
        Some(solution)
    }
}

/// Collect up to `k` cheapest assignments with cost at most `max_cost`
pub fn k_best_assignments(
    matrix: CostMatrix,
    tol: f64,
    max_cost: f64,
    k: usize,
) -> Result<Vec<ScoredAssignment>, MapError> {
    let mut enumerator = MurtyEnumerator::new(matrix, tol, max_cost)?;
    let mut results = vec![];
    while results.len() < k {
        match enumerator.next_assignment() {
            Some(solution) => results.push(solution),
            None => break,
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use crate::base::MapError;

    use super::super::hungarian::CostMatrix;
    use super::{k_best_assignments, MurtyEnumerator};

    const INF: f64 = 1e10;

    fn matrix(n: usize, data: Vec<f64>) -> CostMatrix {
        CostMatrix::new(n, data, INF).unwrap()
    }

    /// All permutation costs in ascending order
    fn brute_force_costs(n: usize, data: &[f64]) -> Vec<f64> {
        (0..n)
            .permutations(n)
            .map(|perm| {
                perm.iter()
                    .enumerate()
                    .map(|(i, &j)| data[i * n + j])
                    .sum::<f64>()
            })
            .sorted_by(f64::total_cmp)
            .collect()
    }

    #[test]
    fn test_k_best_matches_brute_force() {
        let data = vec![
            7.0, 5.0, 3.0, //
            2.0, 9.0, 6.0, //
            4.0, 8.0, 1.0,
        ];
        let expect = brute_force_costs(3, &data);

        let results = k_best_assignments(matrix(3, data), 1e-9, f64::INFINITY, 6).unwrap();
        assert_eq!(results.len(), 6);
        for (result, expect_cost) in results.iter().zip(expect.iter()) {
            assert_relative_eq!(result.cost, *expect_cost);
        }

        // Pairwise distinct assignments
        for (a, b) in results.iter().tuple_combinations() {
            assert_ne!(a.assignment, b.assignment);
        }
    }

    #[test]
    fn test_emissions_are_monotone() {
        let data = vec![
            1.0, 2.0, 4.0, 8.0, //
            16.0, 1.0, 2.0, 4.0, //
            8.0, 16.0, 1.0, 2.0, //
            4.0, 8.0, 16.0, 1.0,
        ];
        let mut enumerator =
            MurtyEnumerator::new(matrix(4, data), 1e-9, f64::INFINITY).unwrap();
        let mut previous = f64::NEG_INFINITY;
        let mut count = 0;
        while let Some(solution) = enumerator.next_assignment() {
            assert!(solution.cost >= previous);
            previous = solution.cost;
            count += 1;
        }
        assert_eq!(count, 24);
    }

    #[test]
    fn test_max_cost_ceiling() {
        let data = vec![
            1.0, 10.0, //
            10.0, 1.0,
        ];
        // Best is 2.0, second best is 20.0
        let results = k_best_assignments(matrix(2, data.clone()), 1e-9, 5.0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_relative_eq!(results[0].cost, 2.0);

        assert_eq!(
            MurtyEnumerator::new(matrix(2, data), 1e-9, 1.0).unwrap_err(),
            MapError::NoAssignmentsUnderBound
        );
    }

    #[test]
    fn test_infeasible_root() {
        let data = vec![
            INF, INF, //
            1.0, 1.0,
        ];
        assert_eq!(
            MurtyEnumerator::new(matrix(2, data), 1e-9, f64::INFINITY).unwrap_err(),
            MapError::NoAssignmentsUnderBound
        );
    }
}
