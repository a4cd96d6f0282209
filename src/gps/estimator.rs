//! Edge/sentence correlation into a published clock offset.
//!
//! The PPS edge marks the true top of a second; the ZDA sentence that
//! follows it over the slower serial link names that second. Their
//! difference is the skew between the local wall clock and UTC:
//!
//! ```text
//! local clock  ──|edge T|───────────────|ZDA "S"|──▶
//!                 offset = T - S
//! ```
//!
//! No filtering is applied: each correlation replaces the previous sample.
//! Samples are published through a `tokio::sync::watch` channel, so readers
//! always observe a complete sample and never block the ingestion loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use super::edge::{EdgeCapture, EdgeEvent};
use super::nmea::CalendarSample;
use crate::clock::SharedClock;

/// Default limit on how old a pending edge may be when its sentence arrives.
pub const DEFAULT_MAX_EDGE_AGE: Duration = Duration::from_secs(2);

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// One edge/sentence correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSample {
    edge_time: Duration,
    calendar_time: i64,
    offset_nanos: i128,
}

impl OffsetSample {
    /// Correlate an edge with the Unix second its sentence reported.
    #[must_use]
    pub fn new(edge: EdgeEvent, calendar_time: i64) -> Self {
        Self {
            edge_time: edge.timestamp,
            calendar_time,
            offset_nanos: edge.as_nanos() - i128::from(calendar_time) * NANOS_PER_SEC,
        }
    }

    /// Local wall-clock time of the edge, since the Unix epoch.
    #[must_use]
    pub fn edge_time(&self) -> Duration {
        self.edge_time
    }

    /// Unix second reported by the sentence.
    #[must_use]
    pub fn calendar_time(&self) -> i64 {
        self.calendar_time
    }

    /// `edge_time - calendar_time` in nanoseconds.
    #[must_use]
    pub fn offset_nanos(&self) -> i128 {
        self.offset_nanos
    }

    /// `edge_time - calendar_time` in seconds.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "offsets are far below 2^52 ns; used for display"
    )]
    pub fn offset_secs(&self) -> f64 {
        self.offset_nanos as f64 / 1e9
    }

    /// Apply the offset to a local instant, in nanoseconds since the Unix
    /// epoch.
    #[must_use]
    pub fn apply(&self, local: Duration) -> i128 {
        i128::try_from(local.as_nanos()).unwrap_or(i128::MAX) + self.offset_nanos
    }
}

/// Estimator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    /// Nothing published yet.
    NoSample,
    /// At least one sample published.
    HasSample,
}

/// Outcome of handling one calendar sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// A new sample was published.
    Published(OffsetSample),
    /// No edge was pending; the sentence was dropped.
    NoEdge,
    /// The pending edge was older than the pairing window and was dropped.
    StaleEdge {
        /// Edge age when the sentence arrived
        age: Duration,
    },
    /// The pending edge is later than the current time (clock stepped
    /// backwards) and was dropped.
    FutureEdge {
        /// How far ahead of now the edge was
        lead: Duration,
    },
}

/// The estimator was dropped before publishing any sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("offset estimator stopped before publishing a sample")]
pub struct EstimatorClosed;

/// Publishing side: owned by the ingestion loop.
pub struct OffsetEstimator {
    capture: Arc<EdgeCapture>,
    clock: SharedClock,
    max_edge_age: Duration,
    tx: watch::Sender<Option<OffsetSample>>,
    state: EstimatorState,
}

impl OffsetEstimator {
    /// Create an estimator and a reader for its samples.
    #[must_use]
    pub fn new(
        capture: Arc<EdgeCapture>,
        clock: SharedClock,
        max_edge_age: Duration,
    ) -> (Self, OffsetReader) {
        let (tx, rx) = watch::channel(None);
        let estimator = Self {
            capture,
            clock,
            max_edge_age,
            tx,
            state: EstimatorState::NoSample,
        };
        (estimator, OffsetReader { rx })
    }

    /// Pair `calendar` with the pending edge, if any.
    pub fn on_calendar(&mut self, calendar: &CalendarSample) -> Correlation {
        let Some(edge) = self.capture.take() else {
            return Correlation::NoEdge;
        };

        let now = self.clock.now();
        if edge.timestamp > now {
            return Correlation::FutureEdge {
                lead: edge.timestamp - now,
            };
        }
        let age = now - edge.timestamp;
        if age > self.max_edge_age {
            return Correlation::StaleEdge { age };
        }

        let sample = OffsetSample::new(edge, calendar.epoch_seconds());
        self.tx.send_replace(Some(sample));
        self.state = EstimatorState::HasSample;
        Correlation::Published(sample)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Most recently published sample.
    #[must_use]
    pub fn current(&self) -> Option<OffsetSample> {
        *self.tx.borrow()
    }

    /// Another reader for the published samples.
    #[must_use]
    pub fn reader(&self) -> OffsetReader {
        OffsetReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Pairing window.
    #[must_use]
    pub fn max_edge_age(&self) -> Duration {
        self.max_edge_age
    }

    /// The edge mailbox this estimator drains.
    #[must_use]
    pub fn capture(&self) -> &Arc<EdgeCapture> {
        &self.capture
    }
}

impl std::fmt::Debug for OffsetEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetEstimator")
            .field("state", &self.state)
            .field("max_edge_age", &self.max_edge_age)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

/// Reading side: snapshots of the latest sample.
#[derive(Debug, Clone)]
pub struct OffsetReader {
    rx: watch::Receiver<Option<OffsetSample>>,
}

impl OffsetReader {
    /// Latest published sample, if any.
    #[must_use]
    pub fn current(&self) -> Option<OffsetSample> {
        *self.rx.borrow()
    }

    /// Wait until a sample has been published and return it.
    ///
    /// Returns immediately if one already exists.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorClosed`] if the estimator is dropped first.
    pub async fn wait_ready(&mut self) -> Result<OffsetSample, EstimatorClosed> {
        let guard = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| EstimatorClosed)?;
        (*guard).ok_or(EstimatorClosed)
    }

    /// Wait for the next publication after the last one this reader saw.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorClosed`] if the estimator is dropped.
    pub async fn changed(&mut self) -> Result<Option<OffsetSample>, EstimatorClosed> {
        self.rx.changed().await.map_err(|_| EstimatorClosed)?;
        Ok(*self.rx.borrow_and_update())
    }
}
