use nalgebra::Matrix3;

/// Right-multiplication swaps columns `col1` and `col2`
pub fn swapping_column_matrix(col1: usize, col2: usize) -> Matrix3<i32> {
    let mut m = Matrix3::identity();
    m[(col1, col1)] = 0;
    m[(col2, col2)] = 0;
    m[(col1, col2)] = 1;
    m[(col2, col1)] = 1;
    m
}

/// Right-multiplication adds `k` times column `from` to column `to`
pub fn adding_column_matrix(from: usize, to: usize, k: i32) -> Matrix3<i32> {
    let mut m = Matrix3::identity();
    m[(from, to)] = k;
    m
}

/// Right-multiplication flips the sign of column `col`
pub fn changing_column_sign_matrix(col: usize) -> Matrix3<i32> {
    let mut m = Matrix3::identity();
    m[(col, col)] = -1;
    m
}
