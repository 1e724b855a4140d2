//! Atlas module - loaded maps and the registry that owns them.
//!
//! - [`map::Map`] - point cloud plus map-to-ECEF transform
//! - [`map::MapHandle`] - generation-tagged handle to a loaded map
//! - [`registry::MapRegistry`] - handle table with load/free/lookup

pub mod map;
pub mod registry;

pub use map::{Map, MapData, MapHandle};
pub use registry::{MapRegistry, MapSource};
