//! Process-wide integer configuration.

pub mod params;
pub mod store;

pub use params::Param;
pub use store::ConfigStore;
