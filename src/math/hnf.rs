use nalgebra::Matrix3;

/// Column-style Hermite normal form of a non-singular integer matrix.
///
/// The result `h` is lower triangular with positive diagonal entries,
/// `h[(i, j)]` reduced into `[0, h[(i, i)])` for `j < i`, and satisfies
/// `h = m * r` for some unimodular `r`.
pub fn hnf(m: &Matrix3<i32>) -> Matrix3<i32> {
    let mut h = *m;

    for s in 0..3 {
        loop {
            if (s..3).all(|j| h[(s, j)] == 0) {
                break;
            }

            // Choose pivot column with the smallest absolute value
            let pivot = (s..3)
                .filter(|&j| h[(s, j)] != 0)
                .min_by_key(|&j| h[(s, j)].abs())
                .unwrap();
            h.swap_columns(s, pivot);

            if h[(s, s)] < 0 {
                for i in 0..3 {
                    h[(i, s)] *= -1;
                }
            }

            let mut update = false;
            for j in 0..3 {
                if j == s {
                    continue;
                }
                let k = h[(s, j)].div_euclid(h[(s, s)]);
                if k != 0 {
                    update = true;
                    for i in 0..3 {
                        h[(i, j)] -= k * h[(i, s)];
                    }
                }
            }

            if !update {
                break;
            }
        }
    }

    h
}

/// Enumerate all Hermite normal forms with the given positive determinant,
/// in lexicographic order of `(h00, h11, h22, h10, h20, h21)`.
///
/// Every sublattice of index `det` has exactly one basis in this list.
pub fn hnf_matrices_of_determinant(det: i32) -> Vec<Matrix3<i32>> {
    let mut matrices = vec![];
    if det <= 0 {
        return matrices;
    }

    for a in 1..=det {
        if det % a != 0 {
            continue;
        }
        let bc = det / a;
        for b in 1..=bc {
            if bc % b != 0 {
                continue;
            }
            let c = bc / b;
            for d in 0..b {
                for e in 0..c {
                    for f in 0..c {
                        let mut h = Matrix3::zeros();
                        h[(0, 0)] = a;
                        h[(1, 1)] = b;
                        h[(2, 2)] = c;
                        h[(1, 0)] = d;
                        h[(2, 0)] = e;
                        h[(2, 1)] = f;
                        matrices.push(h);
                    }
                }
            }
        }
    }

    matrices
}
