pub mod atlas;
pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod localization;
pub mod mapping;
pub mod system;

pub use error::{VpsError, VpsResult};
