//! GPS clock discipline.
//!
//! Turns a PPS edge and an NMEA date/time stream into a clock offset:
//!
//! ```text
//! GPIO thread ── on_edge() ──▶ EdgeCapture (1 slot)
//!                                   │ take()
//! serial ─▶ SentenceFramer ─▶ SentenceParser ─▶ OffsetEstimator ─▶ watch ─▶ OffsetReader
//! ```

pub mod edge;
pub mod estimator;
pub mod ingest;
pub mod nmea;

#[cfg(test)]
mod tests;

pub use edge::{EdgeCapture, EdgeEvent, EdgeSource, NoopEdgeSource};
pub use estimator::{
    Correlation, DEFAULT_MAX_EDGE_AGE, EstimatorClosed, EstimatorState, OffsetEstimator,
    OffsetReader, OffsetSample,
};
pub use ingest::{DEFAULT_READ_TIMEOUT, IngestLoop, IngestStats};
pub use nmea::{CalendarSample, DEFAULT_SENTENCE_TAG, ParseError, SentenceFramer, SentenceParser};
