use std::collections::HashSet;
use std::collections::VecDeque;
use std::ops::Mul;

use nalgebra::base::{Matrix3, Vector3};

use super::lattice::Lattice;

/// Rotation matrix in a crystallographic basis
pub type Rotation = Matrix3<i32>;
pub type CartesianRotation = Matrix3<f64>;
/// Translation vector in a crystallographic basis
pub type Translation = Vector3<f64>;

/// Space-group operation `x -> rotation * x + translation` in fractional coordinates
#[derive(Debug, Clone)]
pub struct Operation {
    pub rotation: Rotation,
    pub translation: Translation,
}

impl Operation {
    pub fn new(rotation: Rotation, translation: Translation) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation::identity(), Translation::zeros())
    }

    pub fn is_pure_translation(&self) -> bool {
        self.rotation == Rotation::identity()
    }

    /// Return rotation matrix in cartesian coordinates with respect to the given lattice
    pub fn cartesian_rotation(&self, lattice: &Lattice) -> CartesianRotation {
        lattice.basis * self.rotation.map(|e| e as f64) * lattice.inverse()
    }

    /// Return translation vector in cartesian coordinates with respect to the given lattice
    pub fn cartesian_translation(&self, lattice: &Lattice) -> Vector3<f64> {
        lattice.basis * self.translation
    }
}

impl Mul for Operation {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        // (r1, t1) * (r2, t2) = (r1 * r2, r1 * t2 + t1)
        let new_rotation = self.rotation * rhs.rotation;
        let new_translation = self.rotation.map(|e| e as f64) * rhs.translation + self.translation;
        Self::new(new_rotation, new_translation)
    }
}

pub type Operations = Vec<Operation>;

fn visited_key(operation: &Operation) -> (Rotation, [i64; 3]) {
    let quantized = operation
        .translation
        .map(|e| ((e.rem_euclid(1.0)) * 1e8).round() as i64 % 100_000_000);
    (
        operation.rotation,
        [quantized[0], quantized[1], quantized[2]],
    )
}

/// Close the given generators into a group.
/// Translations are compared modulo lattice vectors.
pub fn generate_group(generators: &[Operation]) -> Operations {
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    let mut group = Vec::with_capacity(48);

    queue.push_back(Operation::identity());

    while let Some(element) = queue.pop_front() {
        if !visited.insert(visited_key(&element)) {
            continue;
        }
        group.push(element.clone());

        for generator in generators {
            let mut product = element.clone() * generator.clone();
            product.translation = product.translation.map(|e| e.rem_euclid(1.0));
            queue.push_back(product);
        }
    }

    group
}

#[cfg(test)]
mod tests {
    use nalgebra::matrix;

    use super::{generate_group, Operation, Translation};
    use crate::base::lattice::Lattice;

    #[test]
    fn test_cartesian_rotation() {
        let lattice = Lattice::from_basis(matrix![
            1.0, -0.5, 0.0;
            0.0, f64::sqrt(3.0) / 2.0, 0.0;
            0.0, 0.0, 1.0;
        ])
        .unwrap();
        let operation = Operation::new(
            matrix![
                0, -1, 0;
                1, -1, 0;
                0, 0, 1;
            ],
            Translation::zeros(),
        );

        let actual = operation.cartesian_rotation(&lattice);
        let expect = matrix![
            -0.5, -f64::sqrt(3.0) / 2.0, 0.0;
            f64::sqrt(3.0) / 2.0, -0.5, 0.0;
            0.0, 0.0, 1.0;
        ];
        assert_relative_eq!(actual, expect, epsilon = 1e-12);
    }

    #[test]
    fn test_generate_group_order() {
        // Generators of the full cubic point group m-3m
        let generators = vec![
            Operation::new(
                matrix![
                    0, -1, 0;
                    1, 0, 0;
                    0, 0, 1;
                ],
                Translation::zeros(),
            ),
            Operation::new(
                matrix![
                    0, 0, 1;
                    1, 0, 0;
                    0, 1, 0;
                ],
                Translation::zeros(),
            ),
            Operation::new(-nalgebra::Matrix3::identity(), Translation::zeros()),
        ];
        let group = generate_group(&generators);
        assert_eq!(group.len(), 48);
    }

    #[test]
    fn test_generate_group_with_centering() {
        // Identity rotation with a body-centering translation doubles the group
        let generators = vec![Operation::new(
            nalgebra::Matrix3::identity(),
            Translation::new(0.5, 0.5, 0.5),
        )];
        let group = generate_group(&generators);
        assert_eq!(group.len(), 2);
    }
}
