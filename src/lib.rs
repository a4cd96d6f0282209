//! # gpsntp
//!
//! A stratum-1 time server disciplined by a GPS receiver.
//!
//! ## Features
//!
//! - PPS edge capture into a lock-free single-slot mailbox
//! - NMEA `$GPZDA` framing and parsing
//! - Edge/sentence correlation into a published clock offset
//! - 48-byte time-protocol responder over UDP
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gpsntp::{EdgeCapture, NoopEdgeSource, ServerConfig, TimeServer, system_clock};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(device: tokio::net::TcpStream) -> gpsntp::Result<()> {
//! let capture = Arc::new(EdgeCapture::new());
//! let server = TimeServer::bind(ServerConfig::default(), capture.clone(), system_clock()).await?;
//!
//! // Something calls `capture.on_edge()` on every pulse...
//! let report = server
//!     .run(device, NoopEdgeSource::default(), CancellationToken::new())
//!     .await?;
//! println!("served {} requests", report.responder.served);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Wire**: [`protocol::ntp`] - packet and timestamp codec
//! - **Discipline**: [`gps`] - edge capture, NMEA parsing, offset estimation
//! - **Serving**: [`server`] - UDP responder and lifecycle
//! - **Devices**: `hardware` - serial tty and sysfs GPIO (Linux only)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod clock;
/// Error types
pub mod error;

/// Testing utilities
pub mod testing;

pub mod client;
pub mod gps;
#[cfg(target_os = "linux")]
pub mod hardware;
pub mod protocol;
pub mod server;

// Re-exports
pub use clock::{SharedClock, SystemClock, WallClock, system_clock};
pub use error::{GpsNtpError, Result};
pub use gps::{
    CalendarSample, EdgeCapture, EdgeEvent, EdgeSource, NoopEdgeSource, OffsetReader,
    OffsetSample,
};
pub use protocol::ntp::{NtpPacket, NtpTimestamp};
pub use server::{ServerConfig, ServerReport, ServerState, TimeServer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
