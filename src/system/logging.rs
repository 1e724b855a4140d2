//! Log forwarding to a single registered callback.
//!
//! Components log through `tracing`. A [`CallbackLayer`] installed in the
//! subscriber formats each event as `"[LEVEL] target: message"` and hands it
//! to whichever callback currently occupies the [`LogCallbackSlot`].
//! Registering a callback replaces the previous one.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Holder of the single active log callback.
#[derive(Default)]
pub struct LogCallbackSlot {
    callback: RwLock<Option<LogCallback>>,
}

impl LogCallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `callback`, replacing any previous one.
    pub fn register(&self, callback: LogCallback) {
        *self.callback.write() = Some(callback);
    }

    pub fn clear(&self) {
        *self.callback.write() = None;
    }

    pub fn is_registered(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Deliver one formatted line to the active callback, if any.
    pub fn emit(&self, line: &str) {
        // Clone out of the lock so the callback may re-register.
        let callback = self.callback.read().clone();
        if let Some(cb) = callback {
            cb(line);
        }
    }
}

impl fmt::Debug for LogCallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogCallbackSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// `tracing_subscriber` layer forwarding events into a [`LogCallbackSlot`].
pub struct CallbackLayer {
    slot: Arc<LogCallbackSlot>,
}

impl CallbackLayer {
    pub fn new(slot: Arc<LogCallbackSlot>) -> Self {
        Self { slot }
    }
}

impl<S: Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.slot.is_registered() {
            return;
        }
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let line = format!(
            "[{}] {}: {}{}",
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        );
        self.slot.emit(&line);
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// (falling back to `default_level`) plus callback forwarding.
pub fn init_logging(default_level: &str, slot: Arc<LogCallbackSlot>) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(CallbackLayer::new(slot))
        .try_init()?;
    Ok(())
}
