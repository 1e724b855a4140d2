//! Localization results and counters.
//!
//! These types describe what happened during one localization call:
//! - which map won (if any) and the camera pose in that map's frame
//! - the confidence used to rank candidates
//! - process-wide attempt/success counters

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{Matrix3, Vector3};

use crate::atlas::MapHandle;
use crate::geometry::SE3;

/// Raw handle value reported when no map matched.
pub const NO_MAP_HANDLE: i32 = -1;

/// Result of one localization attempt.
///
/// The pose is meaningful only when `confidence > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizeInfo {
    pub handle: Option<MapHandle>,
    /// Camera-to-map pose in the winning map's frame.
    pub pose: SE3,
    pub confidence: i32,
    pub num_matches: u32,
}

impl LocalizeInfo {
    pub fn failed() -> Self {
        Self {
            handle: None,
            pose: SE3::identity(),
            confidence: 0,
            num_matches: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.handle.is_some() && self.confidence > 0
    }

    pub fn handle_raw(&self) -> i32 {
        self.handle.map_or(NO_MAP_HANDLE, |h| h.as_raw())
    }

    pub fn position(&self) -> Vector3<f64> {
        self.pose.translation
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.pose.rotation_matrix()
    }
}

/// Fixed-layout form of [`LocalizeInfo`] for the flat API.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatLocalizeInfo {
    pub handle: i32,
    pub position: [f32; 3],
    /// Quaternion as `x, y, z, w`.
    pub rotation: [f32; 4],
    pub confidence: i32,
}

impl From<&LocalizeInfo> for FlatLocalizeInfo {
    fn from(info: &LocalizeInfo) -> Self {
        let t = info.pose.translation;
        let q = info.pose.rotation.quaternion();
        Self {
            handle: info.handle_raw(),
            position: [t.x as f32, t.y as f32, t.z as f32],
            rotation: [q.i as f32, q.j as f32, q.k as f32, q.w as f32],
            confidence: info.confidence,
        }
    }
}

/// Process-wide localization counters.
#[derive(Debug, Default)]
pub struct LocalizerStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    candidates_tried: AtomicU64,
    engine_errors: AtomicU64,
    budget_overruns: AtomicU64,
}

/// Point-in-time copy of [`LocalizerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub candidates_tried: u64,
    pub engine_errors: u64,
    pub budget_overruns: u64,
}

impl LocalizerStats {
    pub(crate) fn record_attempt(&self, success: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_candidate(&self) {
        self.candidates_tried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_engine_error(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_budget_overrun(&self) {
        self.budget_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            candidates_tried: self.candidates_tried.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_failed_sentinel() {
        let info = LocalizeInfo::failed();
        assert!(!info.is_success());
        assert_eq!(info.handle_raw(), NO_MAP_HANDLE);
        assert_eq!(FlatLocalizeInfo::from(&info).handle, -1);
    }

    #[test]
    fn test_flat_layout() {
        let q = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let info = LocalizeInfo {
            handle: Some(MapHandle::new(2, 0)),
            pose: SE3 {
                rotation: q,
                translation: Vector3::new(1.0, 2.0, 3.0),
            },
            confidence: 42,
            num_matches: 120,
        };
        let flat = FlatLocalizeInfo::from(&info);
        assert_eq!(flat.handle, 2);
        assert_eq!(flat.position, [1.0, 2.0, 3.0]);
        assert!((flat.rotation[2] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((flat.rotation[3] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(flat.confidence, 42);
    }

    #[test]
    fn test_stats_counters() {
        let stats = LocalizerStats::default();
        stats.record_attempt(true);
        stats.record_attempt(false);
        stats.record_candidate();
        stats.record_engine_error();
        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.candidates_tried, 1);
        assert_eq!(snap.engine_errors, 1);
        assert_eq!(snap.budget_overruns, 0);
    }
}
