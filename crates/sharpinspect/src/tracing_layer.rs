//! Optional capture of `tracing` events into [`ConsoleEntry`] values — the
//! Rust analogue of redirecting a .NET `TraceListener` (spec §4.4). Unlike
//! the raw stdout/stderr fd capture in [`crate::console_hook`], this is not
//! installed automatically: the host wires it into its own
//! `tracing_subscriber` stack, since owning the global subscriber is the
//! host's responsibility (spec §1 Non-goals: logging setup is out of scope).

use std::sync::Arc;

use sharpinspect_core::{
    ConsoleEntry, ConsoleEntryEvent, EventBus, LogLevel, Options, SharedClock, Store,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

type ConsoleStore = Store<ConsoleEntry>;

/// A `tracing_subscriber::Layer` that mirrors every event into the console
/// store, the way spec §4.4 maps trace-framework event types onto levels.
pub struct CaptureLayer {
    options: Arc<Options>,
    store: Arc<ConsoleStore>,
    bus: Arc<EventBus>,
    clock: SharedClock,
}

impl CaptureLayer {
    pub fn new(options: Arc<Options>, store: Arc<ConsoleStore>, bus: Arc<EventBus>) -> Self {
        Self::with_clock(options, store, bus, sharpinspect_core::system_clock())
    }

    pub fn with_clock(
        options: Arc<Options>,
        store: Arc<ConsoleStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
    ) -> Self {
        Self { options, store, bus, clock }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = map_level(*event.metadata().level());
        if level < self.options.min_log_level {
            return;
        }
        let mut message = MessageVisitor::default();
        event.record(&mut message);

        let category = event.metadata().target().to_string();
        let source = event.metadata().file().map(|file| {
            format!(
                "{} in {file}:{}",
                event.metadata().name(),
                event.metadata().line().unwrap_or(0)
            )
        });

        let (_id, entry) = self.store.append_and_get(|id| ConsoleEntry {
            id,
            timestamp: self.clock.now_utc(),
            message: message.0.clone(),
            level,
            category: category.clone(),
            source: source.clone(),
        });
        self.bus.console.publish_async(ConsoleEntryEvent(entry));
    }
}

/// `tracing::Level` has five variants (no Critical); `Verbose` has no
/// counterpart either, so the default-branch-to-Debug case from spec §4.4
/// doesn't arise — every `tracing::Level` maps to exactly one
/// [`LogLevel`], and `Critical` is reachable only through raw stderr writes
/// that a handler chooses to make fatal (documented as DESIGN.md OQ-5).
fn map_level(level: Level) -> LogLevel {
    match level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Information,
        Level::WARN => LogLevel::Warning,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        } else if self.0.is_empty() {
            self.0 = format!("{}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sharpinspect_core::FixedClock;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[test]
    fn level_mapping_is_total_and_ordered() {
        assert_eq!(map_level(Level::TRACE), LogLevel::Trace);
        assert_eq!(map_level(Level::ERROR), LogLevel::Error);
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn injected_clock_supplies_the_event_timestamp() {
        let options = Arc::new(Options::build(|_| {}).unwrap());
        let store: Arc<ConsoleStore> = Arc::new(Store::new(10));
        let bus = Arc::new(EventBus::new());
        let fixed_utc = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let clock: SharedClock = Arc::new(FixedClock { fixed_utc });
        let layer = CaptureLayer::with_clock(options, store.clone(), bus, clock);

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello from a test");
        });

        let entry = store.snapshot().remove(0);
        assert_eq!(entry.timestamp, fixed_utc);
    }
}
