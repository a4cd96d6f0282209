//! Common test utilities and fixtures
#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use gpsntp::testing::zda_sentence;
use gpsntp::{EdgeCapture, EdgeSource, SystemClock, WallClock};
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gpsntp=debug"));

        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Shared step counter for checking shutdown order.
#[derive(Debug, Clone, Default)]
pub struct Sequence(Arc<AtomicU64>);

impl Sequence {
    /// Take the next step number, starting at 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Device stream that records when it is dropped.
pub struct TrackedDevice {
    inner: DuplexStream,
    sequence: Sequence,
    dropped_at: Arc<AtomicU64>,
}

impl TrackedDevice {
    pub fn new(inner: DuplexStream, sequence: Sequence) -> (Self, Arc<AtomicU64>) {
        let dropped_at = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                sequence,
                dropped_at: dropped_at.clone(),
            },
            dropped_at,
        )
    }
}

impl AsyncRead for TrackedDevice {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedDevice {
    fn drop(&mut self) {
        self.dropped_at.store(self.sequence.next(), Ordering::SeqCst);
    }
}

/// Edge source that records when it is disabled.
#[derive(Debug, Clone, Default)]
pub struct TrackedEdges {
    sequence: Sequence,
    pub disabled_at: Arc<AtomicU64>,
}

impl TrackedEdges {
    pub fn new(sequence: Sequence) -> Self {
        Self {
            sequence,
            disabled_at: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl EdgeSource for TrackedEdges {
    fn disable(&mut self) {
        self.disabled_at.store(self.sequence.next(), Ordering::SeqCst);
    }
}

/// Receiver running on the real clock: the local clock is `skew` ahead
/// of the simulated UTC, so each pulse lands `skew` after a local second.
///
/// Hands the serial end back so the device stays open.
pub async fn run_receiver(
    capture: Arc<EdgeCapture>,
    mut serial: DuplexStream,
    skew: Duration,
    pulses: usize,
) -> io::Result<DuplexStream> {
    for _ in 0..pulses {
        let now = SystemClock.now();
        let utc_second = (now - skew).as_secs() + 1;
        let edge_at = Duration::from_secs(utc_second) + skew;
        tokio::time::sleep(edge_at.saturating_sub(now)).await;
        capture.on_edge();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let sentence = zda_sentence(i64::try_from(utc_second).unwrap_or(i64::MAX))
            .ok_or(io::ErrorKind::InvalidInput)?;
        serial.write_all(sentence.as_bytes()).await?;
        serial.write_all(b"\r\n").await?;
    }
    Ok(serial)
}
