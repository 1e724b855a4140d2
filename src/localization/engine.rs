//! Multi-candidate localization.
//!
//! Candidates are matched one at a time in the order the caller gave them.
//! The best result is kept by confidence; on equal confidence the earlier
//! candidate stays, so repeated calls with equal inputs pick the same map.
//! When `AcceptImmediatelyConfidence` is set, the first candidate reaching it
//! ends the search.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nalgebra::UnitQuaternion;

use crate::atlas::{Map, MapHandle, MapRegistry};
use crate::config::{ConfigStore, Param};
use crate::error::{VpsError, VpsResult};
use crate::system::validation::UserValidation;

use super::camera::{CameraIntrinsics, Distortion};
use super::image::{ImageView, block_size, downsample, downsample_factor};
use super::matcher::{MatchParams, MatchRequest, MatchingEngine, PoseCandidate, SolverType};
use super::result::{LocalizeInfo, LocalizerStats, StatsSnapshot};

/// Rotation matrices further than this from orthonormal are discarded.
const ORTHONORMAL_TOL: f64 = 1e-6;

/// One localization call.
#[derive(Debug, Clone, Copy)]
pub struct LocalizeRequest<'a> {
    /// Maps to try, in order. Empty means every loaded map.
    pub candidates: &'a [MapHandle],
    pub image: ImageView<'a>,
    pub intrinsics: CameraIntrinsics,
    pub distortion: Option<Distortion>,
    pub solver: SolverType,
    pub rotation_prior: Option<UnitQuaternion<f64>>,
}

impl<'a> LocalizeRequest<'a> {
    pub fn new(candidates: &'a [MapHandle], image: ImageView<'a>, intrinsics: CameraIntrinsics) -> Self {
        Self {
            candidates,
            image,
            intrinsics,
            distortion: None,
            solver: SolverType::Default,
            rotation_prior: None,
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    pub fn with_solver(mut self, solver: SolverType, rotation_prior: Option<UnitQuaternion<f64>>) -> Self {
        self.solver = solver;
        self.rotation_prior = rotation_prior;
        self
    }
}

/// Best candidate seen so far.
struct Best {
    handle: MapHandle,
    candidate: PoseCandidate,
}

pub struct LocalizationEngine {
    matcher: Arc<dyn MatchingEngine>,
    registry: Arc<MapRegistry>,
    config: Arc<ConfigStore>,
    validation: Arc<UserValidation>,
    stats: LocalizerStats,
}

impl LocalizationEngine {
    pub fn new(
        matcher: Arc<dyn MatchingEngine>,
        registry: Arc<MapRegistry>,
        config: Arc<ConfigStore>,
        validation: Arc<UserValidation>,
    ) -> Self {
        Self {
            matcher,
            registry,
            config,
            validation,
            stats: LocalizerStats::default(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Localize the image against the candidate maps.
    ///
    /// Every candidate handle is resolved before any matching starts, so an
    /// unknown handle fails the call with `InvalidHandle` naming it. A call
    /// where no candidate matches returns [`LocalizeInfo::failed`].
    pub fn localize(&self, request: &LocalizeRequest<'_>) -> VpsResult<LocalizeInfo> {
        self.validation.require()?;
        self.check_request(request)?;

        let maps = self.resolve_candidates(request.candidates)?;

        let max_pixels = self.config.get(Param::LocalizationMaxPixels).max(0) as u64;
        let factor = downsample_factor(request.image.width, request.image.height, max_pixels);
        let scaled;
        let (image, intrinsics) = if factor > 1 {
            scaled = downsample(&request.image, factor);
            let (sx, sy) = block_size(request.image.width, request.image.height, factor);
            tracing::debug!(
                "Downsampled {}x{} image by {} to {}x{}",
                request.image.width,
                request.image.height,
                factor,
                scaled.width,
                scaled.height
            );
            (scaled.view(), request.intrinsics.downscaled(sx, sy))
        } else {
            (request.image, request.intrinsics)
        };

        let params = MatchParams {
            min_match_count: self.config.get(Param::MinimumMatchCount).max(1) as u32,
            budget: Duration::from_millis(self.config.get(Param::MatchingBudgetMs).max(1) as u64),
            solver: request.solver,
            rotation_prior: request.rotation_prior,
        };
        let accept_immediately = self.config.get(Param::AcceptImmediatelyConfidence);

        let match_request = MatchRequest {
            image,
            intrinsics,
            distortion: request.distortion.filter(|d| !d.is_identity()),
            params: &params,
        };

        let t_start = Instant::now();
        let mut best: Option<Best> = None;

        for (handle, map) in &maps {
            let Some(candidate) = self.match_candidate(*handle, map, &match_request) else {
                continue;
            };

            let reached_accept = accept_immediately > 0 && candidate.confidence >= accept_immediately;

            if best
                .as_ref()
                .is_none_or(|b| candidate.confidence > b.candidate.confidence)
            {
                best = Some(Best {
                    handle: *handle,
                    candidate,
                });
            }

            if reached_accept {
                tracing::debug!("Map {} reached accept threshold {}, stopping", handle, accept_immediately);
                break;
            }
        }

        let info = match best {
            Some(Best { handle, candidate }) => LocalizeInfo {
                handle: Some(handle),
                pose: candidate.pose.renormalized(),
                confidence: candidate.confidence,
                num_matches: candidate.num_matches,
            },
            None => LocalizeInfo::failed(),
        };

        self.stats.record_attempt(info.is_success());
        tracing::info!(
            "Localization over {} map(s): {} (confidence {}, {:.1} ms)",
            maps.len(),
            info.handle.map_or_else(|| "no match".to_string(), |h| h.to_string()),
            info.confidence,
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(info)
    }

    fn check_request(&self, request: &LocalizeRequest<'_>) -> VpsResult<()> {
        // Re-check the buffer; the view fields are public.
        ImageView::new(
            request.image.width,
            request.image.height,
            request.image.channels,
            request.image.data,
        )?;
        if !self.matcher.supported_channels().contains(&request.image.channels) {
            return Err(VpsError::InvalidInput(format!(
                "matching engine does not accept {}-channel images",
                request.image.channels
            )));
        }
        request.intrinsics.validate()?;
        if request.solver == SolverType::Prior && request.rotation_prior.is_none() {
            return Err(VpsError::InvalidInput(
                "prior solver requires a rotation prior".into(),
            ));
        }
        Ok(())
    }

    /// Resolve handles to maps, dropping repeats and keeping first occurrence.
    fn resolve_candidates(&self, candidates: &[MapHandle]) -> VpsResult<Vec<(MapHandle, Arc<Map>)>> {
        let handles = if candidates.is_empty() {
            self.registry.live_handles()
        } else {
            let mut unique = Vec::with_capacity(candidates.len());
            for h in candidates {
                if !unique.contains(h) {
                    unique.push(*h);
                }
            }
            unique
        };

        let mut maps = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.registry.get(handle) {
                Ok(map) => maps.push((handle, map)),
                // A map freed between listing and lookup is skipped only for
                // the implicit all-maps case.
                Err(_) if candidates.is_empty() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(maps)
    }

    /// Run the engine on one map and filter out unusable answers.
    fn match_candidate(&self, handle: MapHandle, map: &Map, request: &MatchRequest<'_>) -> Option<PoseCandidate> {
        self.stats.record_candidate();
        let t_start = Instant::now();
        let result = self.matcher.match_map(map, request);
        let elapsed = t_start.elapsed();

        if elapsed > request.params.budget {
            self.stats.record_budget_overrun();
            tracing::warn!(
                "Matching against map {} took {:.0} ms (budget {} ms)",
                handle,
                elapsed.as_secs_f64() * 1000.0,
                request.params.budget.as_millis()
            );
        }

        let candidate = match result {
            Ok(Some(c)) => c,
            Ok(None) => {
                tracing::debug!("Map {}: no pose", handle);
                return None;
            }
            Err(e) => {
                self.stats.record_engine_error();
                tracing::warn!("Matching engine failed on map {}: {:#}", handle, e);
                return None;
            }
        };

        if candidate.confidence <= 0 || candidate.num_matches < request.params.min_match_count {
            tracing::debug!(
                "Map {}: rejected (confidence {}, {} matches)",
                handle,
                candidate.confidence,
                candidate.num_matches
            );
            return None;
        }
        let t = candidate.pose.translation;
        if !(t.x.is_finite() && t.y.is_finite() && t.z.is_finite())
            || !candidate.pose.is_orthonormal(ORTHONORMAL_TOL)
        {
            tracing::warn!("Map {}: engine returned a malformed pose", handle);
            return None;
        }

        tracing::debug!(
            "Map {}: confidence {} ({} matches)",
            handle,
            candidate.confidence,
            candidate.num_matches
        );
        Some(candidate)
    }
}
