//! Localization of camera images against loaded maps.
//!
//! - [`engine::LocalizationEngine`] - ranks per-map poses from the matching engine
//! - [`matcher::MatchingEngine`] - external feature matching collaborator
//! - [`camera`] - pinhole intrinsics and lens distortion
//! - [`image`] - image views and box downsampling
//! - [`result`] - `LocalizeInfo` and counters

pub mod camera;
pub mod engine;
pub mod image;
pub mod matcher;
pub mod result;

pub use camera::{CameraIntrinsics, Distortion};
pub use engine::{LocalizationEngine, LocalizeRequest};
pub use image::{Image, ImageView};
pub use matcher::{MatchParams, MatchRequest, MatchingEngine, PoseCandidate, SolverType};
pub use result::{FlatLocalizeInfo, LocalizeInfo, LocalizerStats, NO_MAP_HANDLE, StatsSnapshot};
