//! Device ingestion loop.
//!
//! Reads the receiver's byte stream, frames it into lines and feeds date/time
//! sentences to the [`OffsetEstimator`]. The loop owns the device reader and
//! drops it before returning, so once the task has been awaited the device
//! is released.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::estimator::{Correlation, OffsetEstimator};
use super::nmea::{SentenceFramer, SentenceParser};
use crate::error::{GpsNtpError, Result};

/// Default bound on a single device read. Shutdown is noticed within this
/// interval.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes requested from the device per read.
pub const READ_CHUNK_SIZE: usize = 512;

/// Counters kept by the ingestion loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Bytes read from the device
    pub bytes_read: u64,
    /// Complete lines framed
    pub lines: u64,
    /// Date/time sentences parsed successfully
    pub sentences: u64,
    /// Date/time sentences that failed to parse
    pub malformed: u64,
    /// Offset samples published
    pub published: u64,
    /// Sentences that found no pending edge
    pub unpaired: u64,
    /// Edges dropped as stale or from the future
    pub stale_edges: u64,
    /// Over-long lines dropped by the framer
    pub overlong: u64,
    /// Edges lost to mailbox overwrite
    pub overwritten_edges: u64,
}

/// The ingestion loop.
#[derive(Debug)]
pub struct IngestLoop {
    framer: SentenceFramer,
    parser: SentenceParser,
    estimator: OffsetEstimator,
    read_timeout: Duration,
    stats: IngestStats,
}

impl IngestLoop {
    /// Create a loop with a default framer.
    #[must_use]
    pub fn new(parser: SentenceParser, estimator: OffsetEstimator, read_timeout: Duration) -> Self {
        Self {
            framer: SentenceFramer::new(),
            parser,
            estimator,
            read_timeout,
            stats: IngestStats::default(),
        }
    }

    /// Replace the line framer.
    #[must_use]
    pub fn with_framer(mut self, framer: SentenceFramer) -> Self {
        self.framer = framer;
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Run until cancelled or the device fails.
    ///
    /// Cancellation is checked before each read; a read in progress is
    /// allowed to finish (it is bounded by the read timeout). The device is
    /// dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::DeviceClosed`] if the stream ends and
    /// [`GpsNtpError::DeviceIo`] if a read fails.
    pub async fn run<R>(mut self, mut device: R, cancel: CancellationToken) -> Result<IngestStats>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        tracing::info!(
            tag = self.parser.tag(),
            read_timeout = ?self.read_timeout,
            "NMEA ingestion starting"
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            match tokio::time::timeout(self.read_timeout, device.read(&mut buf)).await {
                Err(_elapsed) => {
                    tracing::trace!("no device data within read timeout");
                }
                Ok(Ok(0)) => break Err(GpsNtpError::DeviceClosed),
                Ok(Ok(n)) => self.feed(&buf[..n]),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => break Err(GpsNtpError::DeviceIo(e)),
            }
        };

        drop(device);
        tracing::info!(
            lines = self.stats.lines,
            published = self.stats.published,
            malformed = self.stats.malformed,
            "NMEA ingestion stopped, device released"
        );

        match outcome {
            Ok(()) => Ok(self.stats),
            Err(e) => {
                tracing::error!(error = %e, "NMEA ingestion failed");
                Err(e)
            }
        }
    }

    /// Feed raw device bytes and handle every line they complete.
    pub fn feed(&mut self, data: &[u8]) {
        self.stats.bytes_read += data.len() as u64;
        self.framer.feed(data);
        while let Some(line) = self.framer.next_line() {
            self.handle_line(&line);
        }
        self.stats.overlong = self.framer.discarded();
    }

    /// Handle one complete line.
    pub fn handle_line(&mut self, line: &str) {
        self.stats.lines += 1;
        let calendar = match self.parser.parse(line) {
            Ok(Some(calendar)) => calendar,
            Ok(None) => return,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, line, "dropping malformed sentence");
                return;
            }
        };
        self.stats.sentences += 1;

        match self.estimator.on_calendar(&calendar) {
            Correlation::Published(sample) => {
                self.stats.published += 1;
                if self.stats.published == 1 {
                    tracing::info!(
                        utc = %calendar,
                        offset_secs = sample.offset_secs(),
                        "first offset sample published, clock disciplined"
                    );
                } else {
                    tracing::debug!(
                        utc = %calendar,
                        offset_secs = sample.offset_secs(),
                        "offset sample published"
                    );
                }
            }
            Correlation::NoEdge => {
                self.stats.unpaired += 1;
                tracing::debug!(utc = %calendar, "no pending edge, sentence dropped");
            }
            Correlation::StaleEdge { age } => {
                self.stats.stale_edges += 1;
                tracing::debug!(utc = %calendar, ?age, "pending edge too old, dropped");
            }
            Correlation::FutureEdge { lead } => {
                self.stats.stale_edges += 1;
                tracing::warn!(utc = %calendar, ?lead, "pending edge is in the future, dropped");
            }
        }

        let overwritten = self.estimator.capture().overwritten();
        if overwritten > self.stats.overwritten_edges {
            tracing::warn!(
                lost = overwritten - self.stats.overwritten_edges,
                total = overwritten,
                "edges overwritten before a sentence consumed them"
            );
            self.stats.overwritten_edges = overwritten;
        }
    }
}
