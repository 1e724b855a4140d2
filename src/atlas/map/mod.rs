//! Map module - loaded map data and handles.
//!
//! This module contains:
//! - [`Map`] - Immutable point cloud plus its map-to-ECEF transform
//! - [`MapData`] - Decoded map contents, before registration
//! - [`MapHandle`] - Generation-tagged opaque handle naming a loaded map
//!
//! # Example
//!
//! ```ignore
//! use rust_vps::atlas::{MapRegistry, MapSource};
//!
//! let handle = registry.load(&MapSource::file("office.vpsmap"))?;
//! let n = registry.point_count(handle)?;
//! let first_ten = registry.points(handle, 10)?;
//! registry.free(handle)?;
//! ```

pub mod map;
pub mod types;

pub use map::{Map, MapData};
pub use types::MapHandle;
