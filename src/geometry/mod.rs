//! Geometry utilities: rigid/similarity transforms and the map, ECEF and
//! WGS84 coordinate frames.

pub mod frames;
pub mod geo;
pub mod se3;
pub mod sim3;

pub use frames::{
    MapToEcef, dir_map_to_ecef, ecef_to_map, map_to_ecef, map_to_wgs84, rot_ecef_to_map,
    rot_map_to_ecef, wgs84_to_map,
};
pub use geo::{Geodetic, ecef_to_wgs84, wgs84_to_ecef};
pub use se3::SE3;
pub use sim3::Sim3;
