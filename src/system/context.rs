//! Process-wide state, created once at startup and passed to every component.

use std::sync::Arc;

use crate::config::ConfigStore;

use super::logging::{LogCallbackSlot, init_logging};
use super::validation::{TokenAuthority, UserValidation};

/// Shared configuration, validation state and log callback slot.
#[derive(Debug, Clone)]
pub struct VpsContext {
    pub config: Arc<ConfigStore>,
    pub validation: Arc<UserValidation>,
    pub log_slot: Arc<LogCallbackSlot>,
}

impl VpsContext {
    pub fn new(authority: Box<dyn TokenAuthority>) -> Self {
        Self {
            config: Arc::new(ConfigStore::new()),
            validation: Arc::new(UserValidation::new(authority)),
            log_slot: Arc::new(LogCallbackSlot::new()),
        }
    }

    /// Install the global tracing subscriber wired to this context's slot.
    pub fn init_logging(&self, default_level: &str) -> anyhow::Result<()> {
        init_logging(default_level, self.log_slot.clone())
    }
}
