use std::collections::HashSet;

use itertools::iproduct;
use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::base::EPS;

use super::elementary::{adding_column_matrix, swapping_column_matrix};

/// Greedy Minkowski reduction of a three-dimensional column basis.
/// Returns the reduced basis and the unimodular matrix relating them,
/// `reduced = basis * trans_mat`.
pub fn minkowski_reduce(basis: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<i32>) {
    let mut reduced = *basis;
    let mut trans_mat = Matrix3::<i32>::identity();
    let mut visited = HashSet::new();

    loop {
        sort_columns_by_norm(&mut reduced, &mut trans_mat);

        // Size-reduce the second vector against the first
        let k = (reduced.column(0).dot(&reduced.column(1))
            / reduced.column(0).norm_squared())
        .round() as i32;
        if k != 0 {
            let col = reduced.column(0) * (k as f64);
            for i in 0..3 {
                reduced[(i, 1)] -= col[i];
            }
            trans_mat *= adding_column_matrix(0, 1, -k);
        }
        sort_columns_by_norm(&mut reduced, &mut trans_mat);

        // Closest vector to the third basis vector in the plane of the first two
        let gram = Matrix2::new(
            reduced.column(0).norm_squared(),
            reduced.column(0).dot(&reduced.column(1)),
            reduced.column(0).dot(&reduced.column(1)),
            reduced.column(1).norm_squared(),
        );
        let rhs = Vector2::new(
            reduced.column(0).dot(&reduced.column(2)),
            reduced.column(1).dot(&reduced.column(2)),
        );
        let gs_coeffs = gram.try_inverse().unwrap() * rhs;

        let mut cvp_min = f64::INFINITY;
        let mut coeffs_argmin = (0, 0);
        for (d0, d1) in iproduct!(-1..=1, -1..=1) {
            let c0 = gs_coeffs[0].round() as i32 + d0;
            let c1 = gs_coeffs[1].round() as i32 + d1;
            let c = reduced.column(0) * (c0 as f64) + reduced.column(1) * (c1 as f64);
            let cvp = (c - reduced.column(2)).norm();
            if cvp < cvp_min {
                cvp_min = cvp;
                coeffs_argmin = (c0, c1);
            }
        }
        if coeffs_argmin != (0, 0) {
            let c = reduced.column(0) * (coeffs_argmin.0 as f64)
                + reduced.column(1) * (coeffs_argmin.1 as f64);
            for i in 0..3 {
                reduced[(i, 2)] -= c[i];
            }
            trans_mat *= adding_column_matrix(0, 2, -coeffs_argmin.0);
            trans_mat *= adding_column_matrix(1, 2, -coeffs_argmin.1);
        }

        if is_minkowski_reduced(&reduced) {
            break;
        }
        // Stop when the basis revisits an earlier state
        if !visited.insert(trans_mat) {
            break;
        }
    }

    // Preserve parity
    if trans_mat.map(|e| e as f64).determinant() < 0. {
        reduced *= -1.;
        trans_mat *= -1;
    }

    (reduced, trans_mat)
}

fn sort_columns_by_norm(basis: &mut Matrix3<f64>, trans_mat: &mut Matrix3<i32>) {
    for i in 0..3 {
        for j in 0..(2 - i) {
            if basis.column(j).norm() > basis.column(j + 1).norm() + EPS {
                basis.swap_columns(j, j + 1);
                *trans_mat *= swapping_column_matrix(j, j + 1);
            }
        }
    }
}

/// basis is column-wise
pub fn is_minkowski_reduced(basis: &Matrix3<f64>) -> bool {
    let norms: Vec<f64> = basis.column_iter().map(|v| v.norm()).collect();

    if norms[0] > norms[1] + EPS || norms[1] > norms[2] + EPS {
        return false;
    }

    // Shortest combinations that could beat the second vector
    for coeffs in [[1., -1., 0.], [1., 1., 0.]] {
        let v = basis * nalgebra::Vector3::new(coeffs[0], coeffs[1], coeffs[2]);
        if v.norm() + EPS < norms[1] {
            return false;
        }
    }

    // Shortest combinations that could beat the third vector
    for coeffs in [
        [1., 0., 1.],
        [1., 0., -1.],
        [0., 1., 1.],
        [0., 1., -1.],
        [1., -1., -1.],
        [1., -1., 1.],
        [1., 1., -1.],
        [1., 1., 1.],
    ] {
        let v = basis * nalgebra::Vector3::new(coeffs[0], coeffs[1], coeffs[2]);
        if v.norm() + EPS < norms[2] {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use nalgebra::{Matrix3, Vector3};
    use rand::prelude::*;
    use rand::rngs::StdRng;

    use super::{is_minkowski_reduced, minkowski_reduce};

    #[test]
    fn test_is_minkowski_reduced() {
        assert!(is_minkowski_reduced(&Matrix3::identity()));

        let basis = Matrix3::from_columns(&[
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        ]);
        assert!(!is_minkowski_reduced(&basis));
    }

    #[test]
    fn test_minkowski_reduce_small() {
        let basis = Matrix3::identity();
        let (reduced, trans_mat) = minkowski_reduce(&basis);
        assert_relative_eq!(reduced, basis);
        assert_eq!(trans_mat, Matrix3::<i32>::identity());

        let basis = Matrix3::from_columns(&[
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        ]);
        let (reduced, trans_mat) = minkowski_reduce(&basis);
        assert!(is_minkowski_reduced(&reduced));
        assert_relative_eq!(basis * trans_mat.map(|e| e as f64), reduced);
    }

    #[test]
    fn test_minkowski_reduce_random() {
        let mut rng: StdRng = SeedableRng::from_seed([0; 32]);

        for _ in 0..256 {
            let basis =
                Matrix3::<f64>::from_fn(|_, _| rng.random_range(-16..16i32) as f64 + 0.5);
            if basis.determinant().abs() < 1e-8 {
                continue;
            }
            let (reduced, trans_mat) = minkowski_reduce(&basis);
            assert!(is_minkowski_reduced(&reduced));
            assert_relative_eq!(
                basis * trans_mat.map(|e| e as f64),
                reduced,
                epsilon = 1e-8
            );
            assert_eq!(
                trans_mat.map(|e| e as f64).determinant().round() as i32,
                1
            );
        }
    }
}
