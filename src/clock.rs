//! Wall-clock access.
//!
//! Everything that stamps time (edge capture, staleness checks, reply
//! stamping) reads the clock through [`WallClock`] so tests can drive time
//! explicitly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, as a duration since the Unix epoch.
pub trait WallClock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Duration;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn WallClock>;

/// The operating system's realtime clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Shared [`SystemClock`].
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
