use nalgebra::{Matrix3, SymmetricEigen};

/// Lattice (strain) cost conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatticeCostFunction {
    /// `trace(B^2) / 3` with Biot strain `B = U - I`
    #[default]
    Isotropic,
    /// Same norm after projecting out the part of `B` invariant under the
    /// parent factor group
    SymmetryBreaking,
}

/// Right stretch tensor `U = sqrt(F^T F)` of a deformation gradient
pub fn right_stretch_tensor(deformation_gradient: &Matrix3<f64>) -> Matrix3<f64> {
    let eig = SymmetricEigen::new(deformation_gradient.transpose() * deformation_gradient);
    // F is invertible, so the eigenvalues of F^T F are strictly positive
    let sqrt_eigs = Matrix3::from_diagonal(&eig.eigenvalues.map(f64::sqrt));
    eig.eigenvectors * sqrt_eigs * eig.eigenvectors.transpose()
}

fn biot_strain(deformation_gradient: &Matrix3<f64>) -> Matrix3<f64> {
    right_stretch_tensor(deformation_gradient) - Matrix3::identity()
}

/// Rotation-invariant strain cost; zero iff `U = I`
pub fn isotropic_strain_cost(deformation_gradient: &Matrix3<f64>) -> f64 {
    let b = biot_strain(deformation_gradient);
    (b * b).trace() / 3.0
}

/// Strain cost of the symmetry-breaking part of the Biot strain: the group
/// average over the parent's cartesian rotations is removed before norming
pub fn symmetry_breaking_strain_cost(
    deformation_gradient: &Matrix3<f64>,
    cart_rotations: &[Matrix3<f64>],
) -> f64 {
    let b = biot_strain(deformation_gradient);
    let mut invariant = Matrix3::zeros();
    for r in cart_rotations.iter() {
        invariant += r * b * r.transpose();
    }
    invariant /= cart_rotations.len() as f64;
    let breaking = b - invariant;
    (breaking * breaking).trace() / 3.0
}

pub fn lattice_cost(
    deformation_gradient: &Matrix3<f64>,
    cost_function: LatticeCostFunction,
    cart_rotations: &[Matrix3<f64>],
) -> f64 {
    match cost_function {
        LatticeCostFunction::Isotropic => isotropic_strain_cost(deformation_gradient),
        LatticeCostFunction::SymmetryBreaking => {
            symmetry_breaking_strain_cost(deformation_gradient, cart_rotations)
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{matrix, Matrix3};
    use rstest::rstest;

    use super::{
        isotropic_strain_cost, right_stretch_tensor, symmetry_breaking_strain_cost,
    };

    fn rotation_z(angle: f64) -> Matrix3<f64> {
        matrix![
            angle.cos(), -angle.sin(), 0.0;
            angle.sin(), angle.cos(), 0.0;
            0.0, 0.0, 1.0;
        ]
    }

    #[rstest]
    #[case(Matrix3::identity(), 0.0)]
    #[case(Matrix3::identity() * 1.02, 4e-4)]
    #[case(Matrix3::from_diagonal(&nalgebra::Vector3::new(1.1, 1.0, 1.0)), 0.01 / 3.0)]
    fn test_isotropic_strain_cost(#[case] f: Matrix3<f64>, #[case] expect: f64) {
        assert_relative_eq!(isotropic_strain_cost(&f), expect, epsilon = 1e-12);
    }

    #[test]
    fn test_pure_rotation_costs_nothing() {
        let r = rotation_z(0.3);
        assert_relative_eq!(
            right_stretch_tensor(&r),
            Matrix3::identity(),
            epsilon = 1e-12
        );
        assert_relative_eq!(isotropic_strain_cost(&r), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_right_multiplication_by_rotation_is_free() {
        let f = matrix![
            1.05, 0.02, 0.0;
            0.0, 0.98, 0.0;
            0.0, 0.0, 1.01;
        ];
        let cost = isotropic_strain_cost(&f);
        assert_relative_eq!(
            isotropic_strain_cost(&(f * rotation_z(1.1))),
            cost,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            isotropic_strain_cost(&(rotation_z(0.7) * f)),
            cost,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_symmetry_breaking_ignores_invariant_strain() {
        // Full cubic rotation group leaves only the volumetric part invariant
        let rotations = cubic_rotations();

        // Pure dilation is entirely symmetry preserving
        let dilation = Matrix3::identity() * 1.02;
        assert_relative_eq!(
            symmetry_breaking_strain_cost(&dilation, &rotations),
            0.0,
            epsilon = 1e-12
        );

        // A uniaxial stretch breaks cubic symmetry but keeps its trace
        let uniaxial = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.03, 1.0, 1.0));
        let breaking = symmetry_breaking_strain_cost(&uniaxial, &rotations);
        assert!(breaking > 1e-6);
        assert!(breaking < isotropic_strain_cost(&uniaxial) + 1e-12);
    }

    fn cubic_rotations() -> Vec<Matrix3<f64>> {
        let generators = [
            matrix![
                0.0, -1.0, 0.0;
                1.0, 0.0, 0.0;
                0.0, 0.0, 1.0;
            ],
            matrix![
                0.0, 0.0, 1.0;
                1.0, 0.0, 0.0;
                0.0, 1.0, 0.0;
            ],
        ];
        let mut group: Vec<Matrix3<f64>> = vec![Matrix3::identity()];
        loop {
            let mut grew = false;
            let current = group.clone();
            for m in current.iter() {
                for g in generators.iter() {
                    let product = m * g;
                    if !group
                        .iter()
                        .any(|existing| (existing - product).norm() < 1e-8)
                    {
                        group.push(product);
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }
        assert_eq!(group.len(), 24);
        group
    }
}
