//! Mapping-session support: stage images and produce map blobs.

pub mod session;

pub use session::{MapBuilder, MappingSession, StagedImage};
