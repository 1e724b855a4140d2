//! Sim3: 7-DOF similarity transformation (rotation + translation + scale).
//!
//! Map-to-ECEF transforms produced at map capture time are similarities: the
//! map-local frame has an arbitrary scale, so a metric ECEF position is
//! `s * R * p + t`. This type is the decomposed form used whenever only the
//! rotational part of such a transform is needed.

use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};

use crate::error::{VpsError, VpsResult};

/// Scales below this are treated as a collapsed (non-invertible) transform.
const MIN_SCALE: f64 = 1e-12;

/// 7-DOF Similarity transformation.
///
/// Transforms points as: p' = s * R * p + t
#[derive(Debug, Clone, PartialEq)]
pub struct Sim3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl Sim3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Construct from rotation matrix, translation, and scale.
    pub fn from_rts(rotation: Matrix3<f64>, translation: Vector3<f64>, scale: f64) -> Self {
        Self {
            rotation: UnitQuaternion::from_matrix(&rotation),
            translation,
            scale,
        }
    }

    /// Decompose a homogeneous 4x4 matrix of form [s*R | t; 0 | 1].
    ///
    /// The scale is the cube root of the determinant of the linear block, so
    /// small per-axis drift is averaged instead of taken from one column.
    /// Fails on non-finite entries, a projective bottom row, a reflection or
    /// a collapsed linear block.
    pub fn try_from_matrix(mat: &Matrix4<f64>) -> VpsResult<Self> {
        if mat.iter().any(|v| !v.is_finite()) {
            return Err(VpsError::Transform("non-finite matrix entry".into()));
        }
        let bottom = mat.fixed_view::<1, 4>(3, 0);
        if bottom[0].abs() > 1e-9
            || bottom[1].abs() > 1e-9
            || bottom[2].abs() > 1e-9
            || (bottom[3] - 1.0).abs() > 1e-9
        {
            return Err(VpsError::Transform(
                "bottom row must be [0, 0, 0, 1]".into(),
            ));
        }

        let sr_block = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let det = sr_block.determinant();
        if det <= 0.0 {
            return Err(VpsError::Transform(format!(
                "linear block is singular or reflecting (det = {det:e})"
            )));
        }
        let scale = det.cbrt();
        if scale < MIN_SCALE {
            return Err(VpsError::Transform(format!("degenerate scale {scale:e}")));
        }

        let translation = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Ok(Self::from_rts(sr_block / scale, translation, scale))
    }

    /// Convert to homogeneous 4x4 matrix of form [s*R | t; 0 0 0 1].
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.scaled_rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Rotation matrix without scale.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Scaled rotation matrix (s * R).
    pub fn scaled_rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation_matrix() * self.scale
    }
}

impl Default for Sim3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, Vector4};

    fn sample() -> Sim3 {
        Sim3 {
            rotation: UnitQuaternion::from_axis_angle(
                &Unit::new_normalize(Vector3::new(1.0, 0.0, 0.0)),
                std::f64::consts::FRAC_PI_4,
            ),
            translation: Vector3::new(1.0, 2.0, 3.0),
            scale: 2.5,
        }
    }

    #[test]
    fn test_to_from_matrix() {
        let sim3 = sample();
        let back = Sim3::try_from_matrix(&sim3.to_matrix()).unwrap();

        assert_relative_eq!(sim3.scale, back.scale, epsilon = 1e-10);
        assert_relative_eq!(sim3.translation, back.translation, epsilon = 1e-10);
        assert_relative_eq!(
            sim3.rotation_matrix(),
            back.rotation_matrix(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_matrix_applies_scale() {
        let sim3 = Sim3 {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(1.0, 0.0, 0.0),
            scale: 2.0,
        };

        // p' = 2 * I * (1,1,1) + (1,0,0) = (3, 2, 2)
        let p = sim3.to_matrix() * Vector4::new(1.0, 1.0, 1.0, 1.0);
        assert_relative_eq!(p, Vector4::new(3.0, 2.0, 2.0, 1.0), epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_singular_block() {
        let mut mat = Matrix4::identity();
        mat[(2, 2)] = 0.0;
        assert!(matches!(
            Sim3::try_from_matrix(&mat),
            Err(VpsError::Transform(_))
        ));
    }

    #[test]
    fn test_rejects_projective_row() {
        let mut mat = Matrix4::identity();
        mat[(3, 0)] = 0.5;
        assert!(Sim3::try_from_matrix(&mat).is_err());
    }

    #[test]
    fn test_rejects_nan() {
        let mut mat = Matrix4::identity();
        mat[(1, 3)] = f64::NAN;
        assert!(Sim3::try_from_matrix(&mat).is_err());
    }
}
