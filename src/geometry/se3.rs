//! SE3: rigid body transform used for camera poses.

use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};

/// Rigid transform: rotation + translation.
///
/// Transforms points as: p' = R * p + t
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation matrix and translation.
    ///
    /// The matrix is re-orthonormalized, so slightly drifted input still
    /// yields a valid rotation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_matrix(&rotation),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix of form [R | t; 0 | 1].
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Re-normalize the rotation quaternion after external arithmetic.
    pub fn renormalized(&self) -> Self {
        let q = self.rotation.into_inner();
        Self {
            rotation: UnitQuaternion::new_normalize(q),
            translation: self.translation,
        }
    }

    /// True when the rotation matrix is orthonormal within `tolerance`.
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let r = self.rotation_matrix();
        let should_be_identity = r.transpose() * r;
        (should_be_identity - Matrix3::identity()).amax() < tolerance
            && (r.determinant() - 1.0).abs() < tolerance
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Unit;

    fn sample_pose() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_axis_angle(
                &Unit::new_normalize(Vector3::new(0.3, -1.0, 0.5)),
                0.8,
            ),
            translation: Vector3::new(1.0, -2.0, 0.5),
        }
    }

    fn homogeneous(pose: &SE3) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&pose.rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&pose.translation);
        mat
    }

    #[test]
    fn test_from_matrix() {
        let pose = sample_pose();
        let back = SE3::from_matrix(homogeneous(&pose));
        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-12);
        assert_relative_eq!(
            back.rotation_matrix(),
            pose.rotation_matrix(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_from_rt_orthonormalizes_drifted_matrix() {
        let mut r = sample_pose().rotation_matrix();
        r[(0, 1)] += 1e-4;
        let pose = SE3::from_rt(r, Vector3::zeros());
        assert!(pose.is_orthonormal(1e-9));
    }

    #[test]
    fn test_renormalized_restores_unit_quaternion() {
        let mut pose = sample_pose();
        pose.rotation = UnitQuaternion::new_unchecked(pose.rotation.into_inner() * 1.01);
        assert!(!pose.is_orthonormal(1e-6));
        let fixed = pose.renormalized();
        assert!(fixed.is_orthonormal(1e-9));
        assert_relative_eq!(
            fixed.rotation_matrix(),
            sample_pose().rotation_matrix(),
            epsilon = 1e-9
        );
    }
}
