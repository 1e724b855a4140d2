//! Map handle type.

/// Bits of the handle used for the slot index.
pub(crate) const INDEX_BITS: u32 = 20;

/// Bits of the handle used for the slot generation.
pub(crate) const GENERATION_BITS: u32 = 11;

pub(crate) const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;
pub(crate) const MAX_GENERATION: u32 = (1 << GENERATION_BITS) - 1;

/// Opaque identifier of a loaded map.
///
/// A handle packs a registry slot index and the generation of that slot at
/// the time the map was loaded. Freeing a map bumps the slot generation, so a
/// stale handle never resolves to a map loaded later into the same slot.
/// The packed value always fits in a non-negative `i32`, which is how handles
/// cross the flat API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapHandle(u32);

impl MapHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        debug_assert!(index <= MAX_INDEX);
        debug_assert!(generation <= MAX_GENERATION);
        Self((generation << INDEX_BITS) | index)
    }

    /// Slot index inside the registry.
    pub fn index(&self) -> u32 {
        self.0 & MAX_INDEX
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.0 >> INDEX_BITS
    }

    /// Integer form used at the flat boundary.
    pub fn as_raw(&self) -> i32 {
        self.0 as i32
    }

    /// Parse a boundary integer. Negative values are never handles.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }
}

impl std::fmt::Display for MapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MAP{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let h = MapHandle::new(123, 7);
        assert_eq!(h.index(), 123);
        assert_eq!(h.generation(), 7);
    }

    #[test]
    fn test_raw_is_non_negative_at_limits() {
        let h = MapHandle::new(MAX_INDEX, MAX_GENERATION);
        assert!(h.as_raw() >= 0);
        assert_eq!(MapHandle::from_raw(h.as_raw()), Some(h));
    }

    #[test]
    fn test_negative_raw_rejected() {
        assert_eq!(MapHandle::from_raw(-1), None);
    }

    #[test]
    fn test_generation_distinguishes_same_slot() {
        let first = MapHandle::new(4, 0);
        let second = MapHandle::new(4, 1);
        assert_ne!(first, second);
        assert_ne!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(format!("{}", MapHandle::new(3, 0)), "MAP3");
    }

    #[test]
    fn test_handle_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<MapHandle, &str> = HashMap::new();
        map.insert(MapHandle::new(1, 0), "first");
        map.insert(MapHandle::new(2, 0), "second");

        assert_eq!(map.get(&MapHandle::new(1, 0)), Some(&"first"));
        assert_eq!(map.get(&MapHandle::new(1, 1)), None);
    }
}
