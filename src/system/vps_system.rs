//! VpsSystem - flat procedural facade over the positioning core.
//!
//! Only primitives, slices and fixed-layout structs cross this boundary:
//! maps are named by raw `i32` handles, matrices are row-major `f64`
//! slices, quaternions are `[x, y, z, w]`. Every method that writes into a
//! caller buffer bounds the write by both the buffer length and any
//! caller-supplied maximum count.

use std::path::Path;
use std::sync::Arc;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use parking_lot::Mutex;

use crate::atlas::{MapHandle, MapRegistry, MapSource};
use crate::capture::{CaptureBuffer, CaptureInfo};
use crate::error::{VpsError, VpsResult};
use crate::geometry::{
    self, Geodetic, MapToEcef, SE3, ecef_to_map, map_to_ecef, map_to_wgs84, rot_ecef_to_map,
    rot_map_to_ecef,
};
use crate::io::map_file::{MapDecoder, VpsMapDecoder};
use crate::localization::{
    CameraIntrinsics, Distortion, FlatLocalizeInfo, ImageView, LocalizationEngine, LocalizeRequest,
    MatchingEngine, SolverType, StatsSnapshot,
};
use crate::mapping::{MapBuilder, MappingSession};

use super::context::VpsContext;
use super::logging::LogCallback;

/// Status value of a call: 0 on success, the error's negative status otherwise.
pub fn status<T>(result: &VpsResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            tracing::debug!("call failed [{}]: {}", e.code(), e);
            e.status()
        }
    }
}

fn handle_from_raw(raw: i32) -> VpsResult<MapHandle> {
    MapHandle::from_raw(raw).ok_or(VpsError::InvalidHandle(raw))
}

fn count_from_raw(count_max: i32) -> VpsResult<usize> {
    usize::try_from(count_max)
        .map_err(|_| VpsError::InvalidInput(format!("negative count {count_max}")))
}

fn quaternion_from_xyzw(q: [f64; 4]) -> VpsResult<UnitQuaternion<f64>> {
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    let norm = raw.norm();
    if !norm.is_finite() || norm < 1e-9 {
        return Err(VpsError::InvalidInput(format!("degenerate quaternion {q:?}")));
    }
    Ok(UnitQuaternion::from_quaternion(raw))
}

fn quaternion_to_xyzw(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Parse a 3x4 or 4x4 row-major rigid pose supplied by the caller.
fn pose_from_row_slice(values: &[f64]) -> VpsResult<SE3> {
    let m = MapToEcef::from_row_slice(values).map_err(|e| match e {
        VpsError::Transform(msg) => VpsError::InvalidInput(format!("camera pose: {msg}")),
        other => other,
    })?;
    let pose = SE3::from_matrix(*m.matrix());
    let r = m.matrix().fixed_view::<3, 3>(0, 0);
    if (r.into_owned() - pose.rotation_matrix()).amax() > 1e-6 {
        return Err(VpsError::InvalidInput("pose rotation is not orthonormal".into()));
    }
    Ok(pose)
}

pub struct VpsSystem {
    context: VpsContext,
    registry: Arc<MapRegistry>,
    localizer: LocalizationEngine,
    capture: CaptureBuffer,
    mapping: Mutex<MappingSession>,
}

impl VpsSystem {
    pub fn new(
        context: VpsContext,
        matcher: Arc<dyn MatchingEngine>,
        builder: Box<dyn MapBuilder>,
    ) -> Self {
        Self::with_decoder(context, matcher, builder, Box::new(VpsMapDecoder))
    }

    pub fn with_decoder(
        context: VpsContext,
        matcher: Arc<dyn MatchingEngine>,
        builder: Box<dyn MapBuilder>,
        decoder: Box<dyn MapDecoder>,
    ) -> Self {
        let registry = Arc::new(MapRegistry::with_decoder(
            context.validation.clone(),
            decoder,
        ));
        let localizer = LocalizationEngine::new(
            matcher.clone(),
            registry.clone(),
            context.config.clone(),
            context.validation.clone(),
        );
        let capture = CaptureBuffer::new(matcher, context.config.clone());
        let mapping = Mutex::new(MappingSession::new(builder, context.validation.clone()));
        Self {
            context,
            registry,
            localizer,
            capture,
            mapping,
        }
    }

    pub fn context(&self) -> &VpsContext {
        &self.context
    }

    pub fn registry(&self) -> &MapRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.localizer.stats()
    }

    // ------------------------------------------------------------------
    // Validation, logging, configuration
    // ------------------------------------------------------------------

    pub fn validate_user(&self, token: &str) -> bool {
        self.context.validation.validate_user(token)
    }

    /// Replace the log callback; `None` removes it.
    pub fn set_log_callback(&self, callback: Option<LogCallback>) {
        match callback {
            Some(cb) => self.context.log_slot.register(cb),
            None => self.context.log_slot.clear(),
        }
    }

    pub fn get_integer(&self, name: &str) -> VpsResult<i32> {
        self.context.config.get_integer(name)
    }

    pub fn set_integer(&self, name: &str, value: i32) -> VpsResult<()> {
        self.context.config.set_integer(name, value)
    }

    // ------------------------------------------------------------------
    // Maps
    // ------------------------------------------------------------------

    pub fn load_map(&self, path: &Path) -> VpsResult<i32> {
        Ok(self.registry.load(&MapSource::file(path))?.as_raw())
    }

    pub fn load_map_bytes(&self, label: &str, data: &[u8]) -> VpsResult<i32> {
        Ok(self.registry.load(&MapSource::bytes(label, data))?.as_raw())
    }

    pub fn free_map(&self, handle: i32) -> VpsResult<()> {
        self.registry.free(handle_from_raw(handle)?)
    }

    /// Write the 16 row-major doubles of the map-to-ECEF transform.
    pub fn map_to_ecef_get(&self, handle: i32, out: &mut [f64]) -> VpsResult<()> {
        let transform = self.registry.map_to_ecef(handle_from_raw(handle)?)?;
        if out.len() < 16 {
            return Err(VpsError::InvalidInput(format!(
                "transform buffer needs 16 values, got {}",
                out.len()
            )));
        }
        out[..16].copy_from_slice(&transform.to_row_major());
        Ok(())
    }

    pub fn points_count(&self, handle: i32) -> VpsResult<i32> {
        let n = self.registry.point_count(handle_from_raw(handle)?)?;
        Ok(i32::try_from(n).unwrap_or(i32::MAX))
    }

    /// Write at most `count_max` points as `x, y, z` triples. Returns the
    /// number of points written.
    pub fn points_get(&self, handle: i32, out: &mut [f32], count_max: i32) -> VpsResult<i32> {
        let handle = handle_from_raw(handle)?;
        let count_max = count_from_raw(count_max)?;
        let n = self.registry.copy_points(handle, out, count_max)?;
        Ok(n as i32)
    }

    /// Map-local point to WGS84 using the map's stored transform.
    pub fn map_point_to_wgs84(&self, handle: i32, point: [f64; 3]) -> VpsResult<[f64; 3]> {
        let transform = self.registry.map_to_ecef(handle_from_raw(handle)?)?;
        Ok(map_to_wgs84(&Vector3::from(point), &transform).to_array())
    }

    // ------------------------------------------------------------------
    // Localization
    // ------------------------------------------------------------------

    /// Localize against `handles` (empty means every loaded map).
    ///
    /// `intrinsics` is `[fx, fy, cx, cy]` or a row-major 3x3 matrix.
    /// `rotation_prior` is an `[x, y, z, w]` quaternion.
    pub fn localize(
        &self,
        handles: &[i32],
        image: &ImageView<'_>,
        intrinsics: &[f64],
        solver: i32,
        rotation_prior: Option<[f64; 4]>,
    ) -> VpsResult<FlatLocalizeInfo> {
        self.localize_impl(handles, image, intrinsics, None, solver, rotation_prior)
    }

    /// Same as [`Self::localize`] with lens distortion `[k1, k2, p1, p2(, k3)]`.
    pub fn localize_distorted(
        &self,
        handles: &[i32],
        image: &ImageView<'_>,
        intrinsics: &[f64],
        distortion: &[f64],
        solver: i32,
        rotation_prior: Option<[f64; 4]>,
    ) -> VpsResult<FlatLocalizeInfo> {
        let distortion = Distortion::from_slice(distortion)?;
        self.localize_impl(handles, image, intrinsics, Some(distortion), solver, rotation_prior)
    }

    fn localize_impl(
        &self,
        handles: &[i32],
        image: &ImageView<'_>,
        intrinsics: &[f64],
        distortion: Option<Distortion>,
        solver: i32,
        rotation_prior: Option<[f64; 4]>,
    ) -> VpsResult<FlatLocalizeInfo> {
        let candidates = handles
            .iter()
            .map(|raw| handle_from_raw(*raw))
            .collect::<VpsResult<Vec<_>>>()?;
        let intrinsics = CameraIntrinsics::from_slice(intrinsics)?;
        let solver = SolverType::from_raw(solver)?;
        let prior = rotation_prior.map(quaternion_from_xyzw).transpose()?;

        let request =
            LocalizeRequest::new(&candidates, *image, intrinsics).with_solver(solver, prior);
        let request = match distortion {
            Some(d) => request.with_distortion(d),
            None => request,
        };

        let info = self.localizer.localize(&request)?;
        Ok(FlatLocalizeInfo::from(&info))
    }

    // ------------------------------------------------------------------
    // Coordinate conversions
    // ------------------------------------------------------------------

    pub fn ecef_to_wgs84(ecef: [f64; 3]) -> [f64; 3] {
        geometry::ecef_to_wgs84(&Vector3::from(ecef)).to_array()
    }

    pub fn wgs84_to_ecef(geo: [f64; 3]) -> [f64; 3] {
        geometry::wgs84_to_ecef(&Geodetic::from_array(geo)).into()
    }

    /// `transform` is a 16- or 12-element row-major map-to-ECEF matrix.
    pub fn map_to_ecef(point: [f64; 3], transform: &[f64]) -> VpsResult<[f64; 3]> {
        let t = MapToEcef::from_row_slice(transform)?;
        Ok(map_to_ecef(&Vector3::from(point), &t).into())
    }

    pub fn ecef_to_map(point: [f64; 3], transform: &[f64]) -> VpsResult<[f64; 3]> {
        let t = MapToEcef::from_row_slice(transform)?;
        Ok(ecef_to_map(&Vector3::from(point), &t)?.into())
    }

    pub fn rot_map_to_ecef(rotation: [f64; 4], transform: &[f64]) -> VpsResult<[f64; 4]> {
        let t = MapToEcef::from_row_slice(transform)?;
        let q = rot_map_to_ecef(&quaternion_from_xyzw(rotation)?, &t)?;
        Ok(quaternion_to_xyzw(&q))
    }

    pub fn rot_ecef_to_map(rotation: [f64; 4], transform: &[f64]) -> VpsResult<[f64; 4]> {
        let t = MapToEcef::from_row_slice(transform)?;
        let q = rot_ecef_to_map(&quaternion_from_xyzw(rotation)?, &t)?;
        Ok(quaternion_to_xyzw(&q))
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    pub fn capture(
        &self,
        out: &mut [u8],
        image: &ImageView<'_>,
        use_matching: bool,
    ) -> VpsResult<CaptureInfo> {
        self.capture.capture(out, image, use_matching)
    }

    // ------------------------------------------------------------------
    // Mapping session
    // ------------------------------------------------------------------

    /// Stage an image with its camera-to-world pose (12 or 16 row-major
    /// doubles). Returns the number of staged images.
    pub fn map_add_image(
        &self,
        image: &ImageView<'_>,
        intrinsics: &[f64],
        pose: &[f64],
    ) -> VpsResult<i32> {
        let intrinsics = CameraIntrinsics::from_slice(intrinsics)?;
        let pose = pose_from_row_slice(pose)?;
        let n = self.mapping.lock().add_image(image, intrinsics, pose)?;
        Ok(i32::try_from(n).unwrap_or(i32::MAX))
    }

    /// Build the staged images into a map file. Returns its point count.
    pub fn map_prepare(&self, path: &Path) -> VpsResult<i32> {
        let n = self.mapping.lock().prepare(path)?;
        Ok(i32::try_from(n).unwrap_or(i32::MAX))
    }

    /// Copy the prepared map blob into `out`. Returns the bytes written.
    pub fn map_get(&self, out: &mut [u8]) -> VpsResult<i32> {
        let bytes = self.mapping.lock().map_bytes()?;
        if bytes.len() > out.len() {
            return Err(VpsError::InvalidInput(format!(
                "map needs {} bytes, buffer holds {}",
                bytes.len(),
                out.len()
            )));
        }
        out[..bytes.len()].copy_from_slice(&bytes);
        i32::try_from(bytes.len())
            .map_err(|_| VpsError::InvalidInput("map blob too large".into()))
    }

    pub fn map_points_count(&self) -> i32 {
        i32::try_from(self.mapping.lock().point_count()).unwrap_or(i32::MAX)
    }

    pub fn map_points_get(&self, out: &mut [f32], count_max: i32) -> VpsResult<i32> {
        let count_max = count_from_raw(count_max)?;
        let session = self.mapping.lock();
        let points = session.points(count_max.min(out.len() / 3));
        for (dst, p) in out.chunks_exact_mut(3).zip(points) {
            dst.copy_from_slice(p.as_slice());
        }
        Ok(points.len() as i32)
    }

    pub fn map_free_resources(&self) {
        self.mapping.lock().free_resources();
    }
}
