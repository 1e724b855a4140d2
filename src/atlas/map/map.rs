//! Map - a loaded point cloud anchored to the Earth.
//!
//! A Map is immutable once built: the registry hands out shared references
//! (`Arc<Map>`) to readers, so point order and the map-to-ECEF transform are
//! stable for the whole lifetime of the handle.

use nalgebra::Vector3;

use crate::geometry::MapToEcef;

/// Decoded map contents, before registration.
#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    /// Point cloud in the map-local frame.
    pub points: Vec<Vector3<f32>>,
    /// Map-local to ECEF transform.
    pub map_to_ecef: MapToEcef,
}

/// A map owned by the registry.
#[derive(Debug)]
pub struct Map {
    points: Vec<Vector3<f32>>,
    map_to_ecef: MapToEcef,
    /// Where the map came from (file path or blob label).
    source_id: String,
}

impl Map {
    pub fn new(data: MapData, source_id: impl Into<String>) -> Self {
        Self {
            points: data.points,
            map_to_ecef: data.map_to_ecef,
            source_id: source_id.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn map_to_ecef(&self) -> &MapToEcef {
        &self.map_to_ecef
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// All points, in storage order.
    pub fn points(&self) -> &[Vector3<f32>] {
        &self.points
    }

    /// The first `max_count` points (or all of them, if fewer).
    pub fn points_prefix(&self, max_count: usize) -> &[Vector3<f32>] {
        &self.points[..self.points.len().min(max_count)]
    }

    /// Copy at most `count_max` points as `x, y, z` triples into `out`.
    ///
    /// Never writes past `count_max` points nor past `out.len() / 3` points.
    /// Returns the number of points written.
    pub fn copy_points_into(&self, out: &mut [f32], count_max: usize) -> usize {
        let n = self.points.len().min(count_max).min(out.len() / 3);
        for (dst, p) in out.chunks_exact_mut(3).zip(&self.points[..n]) {
            dst[0] = p.x;
            dst[1] = p.y;
            dst[2] = p.z;
        }
        n
    }

    /// Axis-aligned bounds of the cloud, `None` for an empty map.
    pub fn bounds(&self) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold((*first, *first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        }))
    }
}

impl std::fmt::Display for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Map({}, {} points)", self.source_id, self.points.len())
    }
}
