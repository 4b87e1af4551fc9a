//! Data model, bounded stores and the in-process event bus behind
//! SharpInspect's capture pipeline.

pub mod clock;
pub mod error;
pub mod event_bus;
pub mod headers;
pub mod model;
pub mod options;
pub mod store;

pub use clock::{system_clock, Clock, FixedClock, SharedClock, SystemClock};
pub use error::{Result, SharpInspectError};
#[cfg(unix)]
pub use event_bus::{clear_panic_fallback_fd, set_panic_fallback_fd};
pub use event_bus::{Broadcaster, EventBus, SubscriptionToken};
pub use headers::HeaderBag;
pub use model::{
    cap_body, ApplicationInfo, AssemblyInfo, ConsoleEntry, ConsoleEntryEvent, LogLevel,
    NetworkEntry, NetworkEntryEvent, PerformanceEntry, PerformanceEntryEvent, StatusClass,
    TRUNCATION_MARKER,
};
pub use options::{CustomDevelopmentCheck, DevelopmentDetectionMode, Options, OptionsBuilder};
pub use store::{Page, Store};
