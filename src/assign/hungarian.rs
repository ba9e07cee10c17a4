use crate::base::MapError;

/// `assignment[row] = col`
pub type Assignment = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAssignment {
    pub cost: f64,
    pub assignment: Assignment,
}

/// Dense square cost matrix with a designated infinity sentinel.
/// Entries at or above the sentinel are forbidden pairs.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    n: usize,
    /// Row-major entries
    data: Vec<f64>,
    infinity: f64,
}

impl CostMatrix {
    pub fn new(n: usize, data: Vec<f64>, infinity: f64) -> Result<Self, MapError> {
        if n == 0 || data.len() != n * n || infinity <= 0.0 {
            return Err(MapError::InvalidInput);
        }
        if data.iter().any(|&e| e.is_nan() || e < 0.0) {
            return Err(MapError::InvalidInput);
        }
        Ok(Self { n, data, infinity })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn infinity(&self) -> f64 {
        self.infinity
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    pub fn is_forbidden(&self, row: usize, col: usize) -> bool {
        self.get(row, col) >= self.infinity
    }

    pub(crate) fn forbid(&mut self, row: usize, col: usize) {
        self.data[row * self.n + col] = self.infinity;
    }

    /// Forbid every cell of `row` except `col`, so any perfect matching
    /// must select `(row, col)`
    pub(crate) fn force(&mut self, row: usize, col: usize) {
        for j in 0..self.n {
            if j != col {
                self.forbid(row, j);
            }
        }
    }
}

const UNASSIGNED: usize = usize::MAX;

/// Solve the linear assignment problem by shortest augmenting paths with
/// dual potentials.
///
/// Ties within `tol` resolve to the lowest column index, so the returned
/// assignment is deterministic.
pub fn solve_assignment(matrix: &CostMatrix, tol: f64) -> Result<ScoredAssignment, MapError> {
    let n = matrix.n();
    let mut u = vec![0.0; n];
    let mut v = vec![0.0; n];
    let mut col4row = vec![UNASSIGNED; n];
    let mut row4col = vec![UNASSIGNED; n];

    for cur_row in 0..n {
        let (sink, min_val, path, scanned_rows, scanned_cols, shortest) =
            augmenting_path(matrix, cur_row, &u, &v, &row4col, tol)?;

        // Update dual potentials along the alternating tree
        u[cur_row] += min_val;
        for i in 0..n {
            if scanned_rows[i] && i != cur_row {
                u[i] += min_val - shortest[col4row[i]];
            }
        }
        for j in 0..n {
            if scanned_cols[j] {
                v[j] -= min_val - shortest[j];
            }
        }

        // Augment along the path ending at the free column `sink`
        let mut j = sink;
        loop {
            let i = path[j];
            row4col[j] = i;
            let next = std::mem::replace(&mut col4row[i], j);
            if i == cur_row {
                break;
            }
            j = next;
        }
    }

    let cost = (0..n).map(|i| matrix.get(i, col4row[i])).sum();
    Ok(ScoredAssignment {
        cost,
        assignment: col4row,
    })
}

#[allow(clippy::type_complexity)]
fn augmenting_path(
    matrix: &CostMatrix,
    cur_row: usize,
    u: &[f64],
    v: &[f64],
    row4col: &[usize],
    tol: f64,
) -> Result<(usize, f64, Vec<usize>, Vec<bool>, Vec<bool>, Vec<f64>), MapError> {
    let n = matrix.n();
    let mut path = vec![UNASSIGNED; n];
    let mut shortest = vec![f64::INFINITY; n];
    let mut scanned_rows = vec![false; n];
    let mut scanned_cols = vec![false; n];

    let mut min_val = 0.0;
    let mut i = cur_row;
    loop {
        scanned_rows[i] = true;

        let mut lowest = f64::INFINITY;
        let mut index = UNASSIGNED;
        for j in 0..n {
            if scanned_cols[j] {
                continue;
            }
            if !matrix.is_forbidden(i, j) {
                let reduced = min_val + matrix.get(i, j) - u[i] - v[j];
                if reduced < shortest[j] {
                    shortest[j] = reduced;
                    path[j] = i;
                }
            }
            // Costs equal within `tol` count as ties; scan order then prefers
            // the lowest column index
            if shortest[j] + tol < lowest {
                lowest = shortest[j];
                index = j;
            }
        }

        if index == UNASSIGNED || lowest == f64::INFINITY {
            // Every remaining column is unreachable with finite cost
            return Err(MapError::InfeasibleAssignment);
        }

        min_val = lowest;
        let j = index;
        if row4col[j] == UNASSIGNED {
            return Ok((j, min_val, path, scanned_rows, scanned_cols, shortest));
        }
        scanned_cols[j] = true;
        i = row4col[j];
    }
}
