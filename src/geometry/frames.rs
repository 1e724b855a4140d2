//! Coordinate frame definitions and transformations between map-local, ECEF
//! and WGS84 frames.
//!
//! # Overview
//!
//! There are three coordinate systems:
//!
//! 1. **Map-local frame** - fixed when the map was captured. Arbitrary origin,
//!    orientation and scale. Localization poses and map point clouds live here.
//! 2. **ECEF** - Earth-Centered-Earth-Fixed Cartesian frame in meters.
//! 3. **WGS84** - latitude/longitude/altitude on the WGS84 ellipsoid
//!    (see [`super::geo`]).
//!
//! Each map owns exactly one map-to-ECEF transform `T_ecef_map`:
//!
//! ```text
//!   p_ecef = T_ecef_map * p_map          (positions, full affine)
//!   R_ecef = R(T_ecef_map) * R_map       (orientations, rotation part only)
//! ```
//!
//! # Transformation pipeline
//!
//! ```text
//! Map-local point
//!     │
//!     ▼ map_to_ecef()               ▲ ecef_to_map()  (needs T invertible)
//!     │                             │
//! ECEF point ───────────────────────┘
//!     │
//!     ▼ geo::ecef_to_wgs84()        ▲ geo::wgs84_to_ecef()
//!     │                             │
//! WGS84 (lat, lon, alt) ────────────┘
//! ```
//!
//! # Matrix layout
//!
//! Transforms cross the flat boundary as 16 row-major doubles
//! `[r00 r01 r02 tx; r10 r11 r12 ty; r20 r21 r22 tz; 0 0 0 1]`. A 12-element
//! 3x4 form (no bottom row) is also accepted.
//!
//! The linear block may contain a uniform scale (map-local units are not
//! necessarily meters). Rotation conversions strip it via [`Sim3`].

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

use crate::error::{VpsError, VpsResult};

use super::geo::{Geodetic, ecef_to_wgs84, wgs84_to_ecef};
use super::sim3::Sim3;

/// Determinant magnitude under which the linear block is treated as singular.
const SINGULAR_DET_EPS: f64 = 1e-18;

/// Map-to-ECEF affine transform (`T_ecef_map`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapToEcef {
    matrix: Matrix4<f64>,
}

impl MapToEcef {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Wrap a homogeneous matrix, rejecting non-finite entries and a
    /// non-affine bottom row.
    pub fn from_matrix(matrix: Matrix4<f64>) -> VpsResult<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(VpsError::Transform("non-finite matrix entry".into()));
        }
        let row = matrix.row(3);
        if row[0] != 0.0 || row[1] != 0.0 || row[2] != 0.0 || row[3] != 1.0 {
            return Err(VpsError::Transform(format!(
                "bottom row must be [0, 0, 0, 1], got [{}, {}, {}, {}]",
                row[0], row[1], row[2], row[3]
            )));
        }
        Ok(Self { matrix })
    }

    /// Parse a row-major 4x4 (16 values) or 3x4 (12 values) transform.
    pub fn from_row_slice(values: &[f64]) -> VpsResult<Self> {
        match values.len() {
            16 => Self::from_matrix(Matrix4::from_row_slice(values)),
            12 => {
                let mut full = [0.0; 16];
                full[..12].copy_from_slice(values);
                full[15] = 1.0;
                Self::from_matrix(Matrix4::from_row_slice(&full))
            }
            n => Err(VpsError::Transform(format!(
                "expected 12 or 16 transform values, got {n}"
            ))),
        }
    }

    pub fn from_sim3(sim3: &Sim3) -> Self {
        Self {
            matrix: sim3.to_matrix(),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// Row-major copy of the 4x4 matrix.
    pub fn to_row_major(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for r in 0..4 {
            for c in 0..4 {
                out[r * 4 + c] = self.matrix[(r, c)];
            }
        }
        out
    }

    /// Translation column: the ECEF position of the map origin.
    pub fn origin_ecef(&self) -> Vector3<f64> {
        Vector3::new(self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)])
    }

    /// Inverse transform (`T_map_ecef`).
    pub fn try_inverse(&self) -> VpsResult<Matrix4<f64>> {
        let det = self.matrix.fixed_view::<3, 3>(0, 0).determinant();
        if det.abs() < SINGULAR_DET_EPS {
            return Err(VpsError::Transform(format!(
                "map-to-ECEF transform is not invertible (det = {det:e})"
            )));
        }
        self.matrix
            .try_inverse()
            .ok_or_else(|| VpsError::Transform("map-to-ECEF transform is not invertible".into()))
    }

    /// Similarity decomposition used for rotation conversions.
    pub fn similarity(&self) -> VpsResult<Sim3> {
        Sim3::try_from_matrix(&self.matrix)
    }
}

impl Default for MapToEcef {
    fn default() -> Self {
        Self::identity()
    }
}

// ============================================================================
// Position Transformations
// ============================================================================

/// Map-local position to ECEF.
pub fn map_to_ecef(p_map: &Vector3<f64>, t_ecef_map: &MapToEcef) -> Vector3<f64> {
    t_ecef_map
        .matrix
        .transform_point(&Point3::from(*p_map))
        .coords
}

/// ECEF position to map-local. Fails when the transform is singular.
pub fn ecef_to_map(p_ecef: &Vector3<f64>, t_ecef_map: &MapToEcef) -> VpsResult<Vector3<f64>> {
    let t_map_ecef = t_ecef_map.try_inverse()?;
    Ok(t_map_ecef.transform_point(&Point3::from(*p_ecef)).coords)
}

/// Map-local position straight to WGS84.
pub fn map_to_wgs84(p_map: &Vector3<f64>, t_ecef_map: &MapToEcef) -> Geodetic {
    ecef_to_wgs84(&map_to_ecef(p_map, t_ecef_map))
}

/// WGS84 position straight to map-local.
pub fn wgs84_to_map(geo: &Geodetic, t_ecef_map: &MapToEcef) -> VpsResult<Vector3<f64>> {
    ecef_to_map(&wgs84_to_ecef(geo), t_ecef_map)
}

// ============================================================================
// Rotation Transformations
// ============================================================================

/// Orientation in the map frame to orientation in ECEF: `R_ecef = R_em * R_map`.
pub fn rot_map_to_ecef(
    r_map: &UnitQuaternion<f64>,
    t_ecef_map: &MapToEcef,
) -> VpsResult<UnitQuaternion<f64>> {
    let sim3 = t_ecef_map.similarity()?;
    Ok(sim3.rotation * r_map)
}

/// Orientation in ECEF to orientation in the map frame: `R_map = R_em^T * R_ecef`.
pub fn rot_ecef_to_map(
    r_ecef: &UnitQuaternion<f64>,
    t_ecef_map: &MapToEcef,
) -> VpsResult<UnitQuaternion<f64>> {
    let sim3 = t_ecef_map.similarity()?;
    Ok(sim3.rotation.inverse() * r_ecef)
}

/// Rotate a direction vector from map to ECEF without translating or scaling it.
pub fn dir_map_to_ecef(d_map: &Vector3<f64>, t_ecef_map: &MapToEcef) -> VpsResult<Vector3<f64>> {
    Ok(t_ecef_map.similarity()?.rotation * d_map)
}
