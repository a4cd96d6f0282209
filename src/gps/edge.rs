//! PPS edge capture.
//!
//! The hardware pulse marks the true top of a UTC second. The interrupt
//! context only stamps the current wall-clock time into a single-slot
//! mailbox; the ingestion loop takes it when the matching calendar sentence
//! arrives.
//!
//! ## Bounded loss
//!
//! The mailbox holds one edge. A second edge that fires before the first is
//! taken overwrites it, and the overwrite is counted in
//! [`EdgeCapture::overwritten`]. At the nominal 1 Hz pulse rate with a
//! sentence following every pulse the slot is drained every second, so a
//! non-zero count means sentences are being lost or delayed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::{SharedClock, system_clock};

/// Slot value meaning "no edge pending".
const EMPTY: u64 = 0;

/// One captured hardware edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Wall-clock time of the edge, since the Unix epoch.
    pub timestamp: Duration,
}

impl EdgeEvent {
    /// Timestamp in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn as_nanos(&self) -> i128 {
        i128::try_from(self.timestamp.as_nanos()).unwrap_or(i128::MAX)
    }
}

/// Single-slot, lock-free mailbox for the most recent edge.
pub struct EdgeCapture {
    /// Edge time in nanoseconds since the Unix epoch, or [`EMPTY`].
    slot: AtomicU64,
    /// Edges overwritten before they were taken.
    overwritten: AtomicU64,
    /// Total edges recorded.
    recorded: AtomicU64,
    clock: SharedClock,
}

impl EdgeCapture {
    /// Create a capture stamping edges with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a capture stamping edges with `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            slot: AtomicU64::new(EMPTY),
            overwritten: AtomicU64::new(0),
            recorded: AtomicU64::new(0),
            clock,
        }
    }

    /// Interrupt entry point: stamp "now" into the slot.
    ///
    /// Never blocks, allocates or logs.
    pub fn on_edge(&self) {
        self.record(self.clock.now());
    }

    /// Record an edge at an explicit instant, replacing any pending one.
    pub fn record(&self, at: Duration) {
        // Saturate rather than wrap; clamp to 1 ns so an epoch-zero edge is
        // still distinguishable from an empty slot.
        let nanos = u64::try_from(at.as_nanos()).unwrap_or(u64::MAX).max(1);
        let previous = self.slot.swap(nanos, Ordering::AcqRel);
        self.recorded.fetch_add(1, Ordering::Relaxed);
        if previous != EMPTY {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Atomically take and clear the pending edge.
    pub fn take(&self) -> Option<EdgeEvent> {
        match self.slot.swap(EMPTY, Ordering::AcqRel) {
            EMPTY => None,
            nanos => Some(EdgeEvent {
                timestamp: Duration::from_nanos(nanos),
            }),
        }
    }

    /// Whether an edge is waiting to be taken.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.load(Ordering::Acquire) != EMPTY
    }

    /// Number of edges lost to overwrite.
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Number of edges recorded.
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

impl Default for EdgeCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EdgeCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCapture")
            .field("pending", &self.is_pending())
            .field("recorded", &self.recorded())
            .field("overwritten", &self.overwritten())
            .finish_non_exhaustive()
    }
}

/// A hardware interrupt source feeding an [`EdgeCapture`].
///
/// The server disables the source only after the ingestion loop has stopped
/// and released the device.
pub trait EdgeSource: Send {
    /// Stop delivering edges and release the underlying line.
    fn disable(&mut self);
}

/// Edge source with nothing to release, for setups that call
/// [`EdgeCapture::record`] directly.
#[derive(Debug, Default)]
pub struct NoopEdgeSource {
    disabled: bool,
}

impl NoopEdgeSource {
    /// Whether [`EdgeSource::disable`] has been called.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl EdgeSource for NoopEdgeSource {
    fn disable(&mut self) {
        self.disabled = true;
    }
}
