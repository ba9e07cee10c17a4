use nalgebra::Matrix3;

/// Integer transformation to a superlattice (det > 0)
pub type Linear = Matrix3<i32>;
/// Element of the unimodular group (det = ±1)
pub type UnimodularLinear = Matrix3<i32>;

pub fn linear_as_f64(linear: &Linear) -> Matrix3<f64> {
    linear.map(|e| e as f64)
}

/// Exact determinant of an integer 3x3 matrix
pub fn linear_determinant(linear: &Linear) -> i32 {
    let m = linear;
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

pub fn is_unimodular(linear: &UnimodularLinear) -> bool {
    linear_determinant(linear).abs() == 1
}

/// Inverse of a unimodular matrix, which is again integer.
/// Returns None when `linear` is not unimodular.
pub fn unimodular_inverse(linear: &UnimodularLinear) -> Option<UnimodularLinear> {
    if !is_unimodular(linear) {
        return None;
    }
    let inv = linear_as_f64(linear).try_inverse()?;
    Some(inv.map(|e| e.round() as i32))
}
