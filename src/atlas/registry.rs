//! MapRegistry - owner of every loaded map.
//!
//! Maps live in an arena of slots. A [`MapHandle`] names a slot plus the
//! slot's generation, and freeing a map bumps the generation, so handles are
//! weak references: a stale handle resolves to `InvalidHandle`, never to a
//! later map that reused the slot. A slot whose generation is exhausted is
//! retired and never handed out again.
//!
//! Load and free take the write lock; lookups take the read lock and clone
//! the map's `Arc`, so a free is atomic with respect to readers.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::atlas::map::types::{MAX_GENERATION, MAX_INDEX};
use crate::atlas::map::{Map, MapData, MapHandle};
use crate::error::{VpsError, VpsResult};
use crate::geometry::MapToEcef;
use crate::io::map_file::{MapDecoder, VpsMapDecoder};
use crate::system::validation::UserValidation;

/// Where map data comes from.
#[derive(Debug, Clone, Copy)]
pub enum MapSource<'a> {
    File(&'a Path),
    Bytes { label: &'a str, data: &'a [u8] },
}

impl<'a> MapSource<'a> {
    pub fn file(path: &'a Path) -> Self {
        Self::File(path)
    }

    pub fn bytes(label: &'a str, data: &'a [u8]) -> Self {
        Self::Bytes { label, data }
    }

    /// Identifier stored with the map and used in error messages.
    pub fn id(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Bytes { label, .. } => format!("blob:{label}"),
        }
    }
}

struct Slot {
    generation: u32,
    map: Option<Arc<Map>>,
}

#[derive(Default)]
struct SlotTable {
    slots: Vec<Slot>,
    /// Vacant, non-retired slot indices, oldest first.
    free: VecDeque<u32>,
    live: usize,
}

impl SlotTable {
    fn insert(&mut self, map: Arc<Map>) -> Option<MapHandle> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                if index > MAX_INDEX {
                    return None;
                }
                self.slots.push(Slot {
                    generation: 0,
                    map: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.map = Some(map);
        self.live += 1;
        Some(MapHandle::new(index, slot.generation))
    }

    fn get(&self, handle: MapHandle) -> Option<&Arc<Map>> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.map.as_ref())
    }

    fn remove(&mut self, handle: MapHandle) -> Option<Arc<Map>> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())?;
        let map = slot.map.take()?;
        self.live -= 1;

        if slot.generation < MAX_GENERATION {
            slot.generation += 1;
            self.free.push_back(handle.index());
        } else {
            debug!("retiring map slot {}", handle.index());
        }
        Some(map)
    }

    fn live_handles(&self) -> Vec<MapHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.map.is_some())
            .map(|(index, slot)| MapHandle::new(index as u32, slot.generation))
            .collect()
    }
}

/// Registry of loaded maps.
pub struct MapRegistry {
    table: RwLock<SlotTable>,
    decoder: Box<dyn MapDecoder>,
    validation: Arc<UserValidation>,
}

impl MapRegistry {
    /// Registry decoding the native `VPSMAP` format.
    pub fn new(validation: Arc<UserValidation>) -> Self {
        Self::with_decoder(validation, Box::new(VpsMapDecoder))
    }

    pub fn with_decoder(validation: Arc<UserValidation>, decoder: Box<dyn MapDecoder>) -> Self {
        Self {
            table: RwLock::new(SlotTable::default()),
            decoder,
            validation,
        }
    }

    /// Parse a map source and register it under a fresh handle.
    ///
    /// Decoding happens before the write lock is taken.
    pub fn load(&self, source: &MapSource<'_>) -> VpsResult<MapHandle> {
        self.validation.require()?;
        let source_id = source.id();

        let bytes: Cow<'_, [u8]> = match source {
            MapSource::File(path) => Cow::Owned(
                std::fs::read(path).map_err(|e| VpsError::map_load(&source_id, e.to_string()))?,
            ),
            MapSource::Bytes { data, .. } => Cow::Borrowed(*data),
        };

        let data = self
            .decoder
            .decode(&bytes)
            .map_err(|e| VpsError::map_load(&source_id, format!("{e:#}")))?;

        self.insert(data, source_id)
    }

    /// Register already decoded map data.
    pub fn insert(&self, data: MapData, source_id: impl Into<String>) -> VpsResult<MapHandle> {
        self.validation.require()?;
        let source_id = source_id.into();
        let num_points = data.points.len();
        let map = Arc::new(Map::new(data, source_id.clone()));

        let handle = self
            .table
            .write()
            .insert(map)
            .ok_or_else(|| VpsError::map_load(&source_id, "map registry is full"))?;

        info!("Loaded map {} from {} ({} points)", handle, source_id, num_points);
        Ok(handle)
    }

    /// Release a map. The handle is invalid afterwards.
    pub fn free(&self, handle: MapHandle) -> VpsResult<()> {
        let map = self
            .table
            .write()
            .remove(handle)
            .ok_or_else(|| VpsError::invalid_handle(handle))?;
        info!("Freed map {} ({})", handle, map.source_id());
        Ok(())
    }

    /// Shared reference to a live map.
    pub fn get(&self, handle: MapHandle) -> VpsResult<Arc<Map>> {
        self.table
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| VpsError::invalid_handle(handle))
    }

    pub fn map_to_ecef(&self, handle: MapHandle) -> VpsResult<MapToEcef> {
        Ok(*self.get(handle)?.map_to_ecef())
    }

    pub fn point_count(&self, handle: MapHandle) -> VpsResult<usize> {
        Ok(self.get(handle)?.num_points())
    }

    /// At most `max_count` points, as a prefix of the stored cloud.
    pub fn points(&self, handle: MapHandle, max_count: usize) -> VpsResult<Vec<Vector3<f32>>> {
        Ok(self.get(handle)?.points_prefix(max_count).to_vec())
    }

    /// Write at most `min(count_max, out.len() / 3)` points as flat triples.
    pub fn copy_points(
        &self,
        handle: MapHandle,
        out: &mut [f32],
        count_max: usize,
    ) -> VpsResult<usize> {
        Ok(self.get(handle)?.copy_points_into(out, count_max))
    }

    /// Live handles in ascending slot order.
    pub fn live_handles(&self) -> Vec<MapHandle> {
        self.table.read().live_handles()
    }

    pub fn len(&self) -> usize {
        self.table.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for MapRegistry {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        let released = table.live;
        for slot in &mut table.slots {
            slot.map = None;
        }
        table.live = 0;
        if released > 0 {
            info!("Released {} map(s) at shutdown", released);
        }
    }
}

impl std::fmt::Debug for MapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::map_file::encode_map;
    use crate::system::validation::StaticTokenAuthority;
    use tempfile::tempdir;

    fn validated() -> Arc<UserValidation> {
        let v = UserValidation::new(Box::new(StaticTokenAuthority::new(["token"])));
        v.validate_user("token");
        Arc::new(v)
    }

    fn sample_data(n: usize, offset: f32) -> MapData {
        MapData {
            points: (0..n)
                .map(|i| Vector3::new(offset + i as f32, 0.0, 1.0))
                .collect(),
            map_to_ecef: MapToEcef::identity(),
        }
    }

    #[test]
    fn test_handles_unique_while_live() {
        let registry = MapRegistry::new(validated());
        let a = registry.insert(sample_data(3, 0.0), "a").unwrap();
        let b = registry.insert(sample_data(3, 10.0), "b").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live_handles(), vec![a, b]);
    }

    #[test]
    fn test_points_then_free_invalidates() {
        let registry = MapRegistry::new(validated());
        let h = registry.insert(sample_data(100, 0.0), "a").unwrap();

        let pts = registry.points(h, 10).unwrap();
        assert_eq!(pts.len(), 10);
        assert_eq!(pts[9], Vector3::new(9.0, 0.0, 1.0));
        assert_eq!(registry.point_count(h).unwrap(), 100);

        registry.free(h).unwrap();
        assert!(matches!(
            registry.points(h, 10),
            Err(VpsError::InvalidHandle(raw)) if raw == h.as_raw()
        ));
        assert!(registry.map_to_ecef(h).is_err());
        assert!(matches!(registry.free(h), Err(VpsError::InvalidHandle(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let registry = MapRegistry::new(validated());
        let old = registry.insert(sample_data(1, 0.0), "old").unwrap();
        registry.free(old).unwrap();

        let new = registry.insert(sample_data(2, 0.0), "new").unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.as_raw(), old.as_raw());
        assert!(registry.get(old).is_err());
        assert_eq!(registry.get(new).unwrap().source_id(), "new");
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let registry = MapRegistry::new(validated());
        for _ in 0..=MAX_GENERATION {
            let h = registry.insert(sample_data(1, 0.0), "cycle").unwrap();
            assert_eq!(h.index(), 0);
            registry.free(h).unwrap();
        }
        let h = registry.insert(sample_data(1, 0.0), "fresh").unwrap();
        assert_eq!(h.index(), 1);
    }

    #[test]
    fn test_load_requires_validation() {
        let v = Arc::new(UserValidation::new(Box::new(StaticTokenAuthority::new(["token"]))));
        let registry = MapRegistry::new(v.clone());
        let blob = encode_map(&sample_data(2, 0.0));

        assert!(matches!(
            registry.load(&MapSource::bytes("m", &blob)),
            Err(VpsError::Unauthorized)
        ));
        v.validate_user("token");
        assert!(registry.load(&MapSource::bytes("m", &blob)).is_ok());
    }

    #[test]
    fn test_load_corrupt_blob() {
        let registry = MapRegistry::new(validated());
        let err = registry
            .load(&MapSource::bytes("junk", b"not a map"))
            .unwrap_err();
        match err {
            VpsError::MapLoad { source_id, .. } => assert_eq!(source_id, "blob:junk"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.vpsmap");
        std::fs::write(&path, encode_map(&sample_data(5, 0.0))).unwrap();

        let registry = MapRegistry::new(validated());
        let h = registry.load(&MapSource::file(&path)).unwrap();
        assert_eq!(registry.point_count(h).unwrap(), 5);
        assert_eq!(registry.map_to_ecef(h).unwrap(), MapToEcef::identity());

        let missing = dir.path().join("missing.vpsmap");
        assert!(matches!(
            registry.load(&MapSource::file(&missing)),
            Err(VpsError::MapLoad { .. })
        ));
    }

    #[test]
    fn test_copy_points_capped() {
        let registry = MapRegistry::new(validated());
        let h = registry.insert(sample_data(50, 0.0), "a").unwrap();
        let mut out = vec![0.0f32; 300];
        assert_eq!(registry.copy_points(h, &mut out, 4).unwrap(), 4);
        assert_eq!(out[12], 0.0);
    }

    #[test]
    fn test_concurrent_readers_and_free() {
        let registry = MapRegistry::new(validated());
        let handles: Vec<_> = (0..8)
            .map(|i| registry.insert(sample_data(64, i as f32), "m").unwrap())
            .collect();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        for h in &handles {
                            // Either the full map or InvalidHandle, never partial.
                            match registry.points(*h, 64) {
                                Ok(points) => assert_eq!(points.len(), 64),
                                Err(e) => assert!(matches!(e, VpsError::InvalidHandle(_))),
                            }
                        }
                    }
                });
            }
            s.spawn(|| {
                for h in handles.iter().step_by(2) {
                    registry.free(*h).unwrap();
                }
            });
        });

        assert_eq!(registry.len(), 4);
    }
}
