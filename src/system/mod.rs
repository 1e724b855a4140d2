//! Process-wide context, validation, log forwarding and the flat facade.
//!
//! This module contains the top-level `VpsSystem` that wires the map
//! registry, localization engine, capture buffer and mapping session to one
//! injected `VpsContext`.

pub mod context;
pub mod logging;
pub mod validation;
mod vps_system;

pub use context::VpsContext;
pub use logging::{CallbackLayer, LogCallback, LogCallbackSlot, init_logging};
pub use validation::{StaticTokenAuthority, TokenAuthority, UserValidation};
pub use vps_system::{VpsSystem, status};
