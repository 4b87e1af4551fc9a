use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Injectable source of monotonic and wall-clock time.
///
/// Production code uses [`SystemClock`]; tests can substitute a
/// [`FixedClock`] to get deterministic timestamps and elapsed durations.
pub trait Clock: Send + Sync {
    /// Current wall-clock time, UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Monotonic instant, for measuring elapsed durations.
    fn monotonic_now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock pinned to a fixed wall-clock instant, for tests.
///
/// `monotonic_now` still returns the real `Instant::now()` since `Instant`
/// has no stable way to construct an arbitrary fixed value; tests that need
/// deterministic elapsed timings should measure deltas against a
/// `FixedClock`-provided baseline directly rather than through `Instant`.
pub struct FixedClock {
    pub fixed_utc: DateTime<Utc>,
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.fixed_utc
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
