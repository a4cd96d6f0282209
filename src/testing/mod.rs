//! Test doubles for the clock, the GPS receiver and the serial device.

pub mod mock_gps;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike};

use crate::clock::WallClock;
use crate::gps::nmea::nmea_checksum;

pub use mock_gps::MockGps;

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` since the Unix epoch.
    #[must_use]
    pub fn new(start: Duration) -> Arc<Self> {
        let clock = Self::default();
        clock.set(start);
        Arc::new(clock)
    }

    /// Jump to `at`.
    pub fn set(&self, at: Duration) {
        let nanos = u64::try_from(at.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Append the `*hh` NMEA checksum to a sentence body.
#[must_use]
pub fn with_checksum(body: &str) -> String {
    format!("{body}*{:02X}", nmea_checksum(body))
}

/// `$GPZDA` sentence (with checksum) for a Unix second.
///
/// Returns `None` for seconds chrono cannot represent.
#[must_use]
pub fn zda_sentence(unix_second: i64) -> Option<String> {
    let t = DateTime::from_timestamp(unix_second, 0)?;
    Some(with_checksum(&format!(
        "$GPZDA,{:02}{:02}{:02}.00,{:02},{:02},{:04},00,00",
        t.hour(),
        t.minute(),
        t.second(),
        t.day(),
        t.month(),
        t.year()
    )))
}
