//! Mock GPS receiver driving a serial stream and the PPS mailbox.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};

use super::{ManualClock, zda_sentence};
use crate::gps::edge::EdgeCapture;

/// Simulated receiver.
///
/// The reading half of the duplex pipe returned by [`MockGps::new`] plays
/// the serial device; edges are stamped with the shared [`ManualClock`].
pub struct MockGps {
    writer: DuplexStream,
    capture: Arc<EdgeCapture>,
    clock: Arc<ManualClock>,
}

impl MockGps {
    /// Create a receiver and the device stream it writes to.
    #[must_use]
    pub fn new(capture: Arc<EdgeCapture>, clock: Arc<ManualClock>) -> (Self, DuplexStream) {
        let (writer, device) = tokio::io::duplex(4096);
        (
            Self {
                writer,
                capture,
                clock,
            },
            device,
        )
    }

    /// Fire the pulse for `unix_second` as seen by a local clock running
    /// `skew` ahead of UTC, then emit the matching ZDA sentence
    /// `sentence_delay` later.
    ///
    /// # Errors
    ///
    /// Returns an error if the device stream is closed.
    pub async fn pulse(
        &mut self,
        unix_second: i64,
        skew: Duration,
        sentence_delay: Duration,
    ) -> io::Result<()> {
        let second = u64::try_from(unix_second).map_err(|_| io::ErrorKind::InvalidInput)?;
        self.clock.set(Duration::from_secs(second) + skew);
        self.capture.on_edge();
        self.clock.advance(sentence_delay);
        let sentence = zda_sentence(unix_second).ok_or(io::ErrorKind::InvalidInput)?;
        self.send_line(&sentence).await
    }

    /// Write one line with its `\r\n` terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the device stream is closed.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }

    /// Write raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the device stream is closed.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// The clock edges are stamped with.
    #[must_use]
    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    /// Unplug the device: the reader sees end of stream.
    pub fn unplug(self) {
        drop(self.writer);
    }
}
