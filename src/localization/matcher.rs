//! Boundary to the external feature matching engine.
//!
//! Feature extraction, descriptor matching and pose solving all happen behind
//! [`MatchingEngine`]. The localization engine only prepares the request
//! (downsampled image, matching intrinsics, tuning knobs) and ranks what comes
//! back.

use std::time::Duration;

use nalgebra::UnitQuaternion;

use crate::atlas::Map;
use crate::error::{VpsError, VpsResult};
use crate::geometry::SE3;

use super::camera::{CameraIntrinsics, Distortion};
use super::image::ImageView;

/// Pose solver the engine should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SolverType {
    #[default]
    Default,
    /// Cheaper solver with fewer refinement steps.
    Lean,
    /// Solver constrained by a caller-supplied rotation prior.
    Prior,
}

impl SolverType {
    pub fn from_raw(raw: i32) -> VpsResult<Self> {
        match raw {
            0 => Ok(Self::Default),
            1 => Ok(Self::Lean),
            2 => Ok(Self::Prior),
            other => Err(VpsError::InvalidInput(format!("unknown solver type {other}"))),
        }
    }
}

/// Tuning knobs forwarded with every match request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchParams {
    pub min_match_count: u32,
    /// Time the engine may spend on one map.
    pub budget: Duration,
    pub solver: SolverType,
    /// Camera orientation prior in the map frame, required by `SolverType::Prior`.
    pub rotation_prior: Option<UnitQuaternion<f64>>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            min_match_count: 30,
            budget: Duration::from_millis(2000),
            solver: SolverType::Default,
            rotation_prior: None,
        }
    }
}

/// One image to match against one map.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub image: ImageView<'a>,
    pub intrinsics: CameraIntrinsics,
    pub distortion: Option<Distortion>,
    pub params: &'a MatchParams,
}

/// Pose the engine found for one map.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    /// Camera-to-map pose: translation is the camera position in the map frame.
    pub pose: SE3,
    /// Ranking key; higher is better, `<= 0` means no match.
    pub confidence: i32,
    /// Inlier correspondences supporting the pose.
    pub num_matches: u32,
}

/// External feature matching engine.
pub trait MatchingEngine: Send + Sync {
    /// Match the image against one map. `Ok(None)` means no pose was found.
    fn match_map(&self, map: &Map, request: &MatchRequest<'_>) -> anyhow::Result<Option<PoseCandidate>>;

    /// Channel counts the engine accepts.
    fn supported_channels(&self) -> &[u8] {
        &[1, 3]
    }

    /// Whether two consecutive frames overlap enough to be chained.
    fn frames_connected(&self, _previous: &ImageView<'_>, _current: &ImageView<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_from_raw() {
        assert_eq!(SolverType::from_raw(0).unwrap(), SolverType::Default);
        assert_eq!(SolverType::from_raw(2).unwrap(), SolverType::Prior);
        assert!(matches!(
            SolverType::from_raw(7),
            Err(VpsError::InvalidInput(_))
        ));
    }
}
