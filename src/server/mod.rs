//! GPS-disciplined time server.
//!
//! [`TimeServer`] runs two tasks: the NMEA ingestion loop that publishes
//! offset samples and the UDP responder that serves them. Shutdown is
//! ordered: the ingestion loop finishes its current read and drops the
//! device, then the edge source is disabled, then the responder stops.

pub mod config;
pub mod responder;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

pub use config::{DEFAULT_RECV_BUF_SIZE, ReplyFields, ServerConfig, ServerConfigBuilder};
pub use responder::{ResponderStats, TimeResponder, build_reply};

use crate::clock::SharedClock;
use crate::error::{GpsNtpError, Result};
use crate::gps::edge::{EdgeCapture, EdgeSource};
use crate::gps::estimator::{OffsetEstimator, OffsetReader};
use crate::gps::ingest::{IngestLoop, IngestStats};
use crate::gps::nmea::SentenceParser;

/// Server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Socket bound, tasks not started
    Starting,
    /// Waiting for the first offset sample
    Disciplining,
    /// Answering requests
    Serving,
    /// Shutting down
    Draining,
    /// Both tasks finished
    Stopped,
}

/// Final counters from a clean shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerReport {
    /// Ingestion loop counters
    pub ingest: IngestStats,
    /// Responder counters
    pub responder: ResponderStats,
}

/// Time server
pub struct TimeServer {
    config: ServerConfig,
    socket: UdpSocket,
    clock: SharedClock,
    estimator: OffsetEstimator,
    offsets: OffsetReader,
    state_tx: watch::Sender<ServerState>,
}

enum Outcome {
    Cancelled,
    Ingest(std::result::Result<Result<IngestStats>, JoinError>),
    Responder(std::result::Result<Result<ResponderStats>, JoinError>),
}

impl TimeServer {
    /// Validate `config` and bind the UDP socket.
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::InvalidConfig`] for a bad configuration and
    /// [`GpsNtpError::Bind`] if the socket cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        capture: Arc<EdgeCapture>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|source| GpsNtpError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        tracing::info!(local_addr = ?socket.local_addr().ok(), "time server bound");

        let (estimator, offsets) =
            OffsetEstimator::new(capture, clock.clone(), config.max_edge_age);
        let (state_tx, _) = watch::channel(ServerState::Starting);

        Ok(Self {
            config,
            socket,
            clock,
            estimator,
            offsets,
            state_tx,
        })
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Reader for the published offset samples
    #[must_use]
    pub fn offsets(&self) -> OffsetReader {
        self.offsets.clone()
    }

    /// Run until `cancel` fires or a task fails.
    ///
    /// `device` is the receiver's byte stream; `edges` is disabled once the
    /// ingestion loop has released the device.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from either task, preferring the
    /// ingestion loop's.
    pub async fn run<R, E>(
        self,
        device: R,
        mut edges: E,
        cancel: CancellationToken,
    ) -> Result<ServerReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
        E: EdgeSource,
    {
        let Self {
            config,
            socket,
            clock,
            estimator,
            mut offsets,
            state_tx,
        } = self;

        let parser =
            SentenceParser::with_tag(config.sentence_tag.clone()).map_err(|e| {
                GpsNtpError::InvalidConfig {
                    name: "sentence_tag".to_string(),
                    message: e.to_string(),
                }
            })?;
        let stop = cancel.child_token();

        let ingest = IngestLoop::new(parser, estimator, config.read_timeout);
        let mut ingest_task = tokio::spawn(ingest.run(device, stop.clone()));

        let responder = TimeResponder::new(
            socket,
            offsets.clone(),
            clock,
            config.reply,
            config.recv_buf_size,
        );
        let mut responder_task = tokio::spawn(responder.run(stop.clone()));

        state_tx.send_replace(ServerState::Disciplining);
        tracing::info!("waiting for first GPS offset sample");

        let mut awaiting_sample = true;
        let outcome = loop {
            tokio::select! {
                () = stop.cancelled() => break Outcome::Cancelled,
                ready = offsets.wait_ready(), if awaiting_sample => {
                    awaiting_sample = false;
                    if let Ok(sample) = ready {
                        state_tx.send_replace(ServerState::Serving);
                        tracing::info!(
                            offset_secs = sample.offset_secs(),
                            "clock disciplined, serving time"
                        );
                    }
                }
                joined = &mut ingest_task => break Outcome::Ingest(joined),
                joined = &mut responder_task => break Outcome::Responder(joined),
            }
        };

        state_tx.send_replace(ServerState::Draining);
        stop.cancel();
        tracing::info!("time server draining");

        let (ingest_joined, responder_joined) = match outcome {
            Outcome::Cancelled => (None, None),
            Outcome::Ingest(joined) => (Some(joined), None),
            Outcome::Responder(joined) => (None, Some(joined)),
        };

        let ingest_joined = match ingest_joined {
            Some(joined) => joined,
            None => ingest_task.await,
        };
        edges.disable();
        tracing::info!("edge source disabled");

        let responder_joined = match responder_joined {
            Some(joined) => joined,
            None => responder_task.await,
        };
        state_tx.send_replace(ServerState::Stopped);

        let ingest = flatten("ingestion", ingest_joined);
        let responder = flatten("responder", responder_joined);
        match (ingest, responder) {
            (Ok(ingest), Ok(responder)) => {
                tracing::info!("time server stopped");
                Ok(ServerReport { ingest, responder })
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                tracing::error!(error = %e, "time server stopped on error");
                Err(e)
            }
        }
    }
}

fn flatten<T>(task: &str, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.map_err(|e| GpsNtpError::TaskFailed {
        message: format!("{task} task: {e}"),
    })?
}

impl std::fmt::Debug for TimeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeServer")
            .field("config", &self.config)
            .field("local_addr", &self.socket.local_addr().ok())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
