use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::ntp::DecodeError;

/// Errors surfaced by the time server.
///
/// Per-datagram and per-sentence problems never reach this type; they are
/// logged and dropped inside the loops. What remains is either fatal for the
/// process or a one-shot client failure.
#[derive(Debug, Error)]
pub enum GpsNtpError {
    // ===== Device Errors =====
    /// Serial device could not be opened or configured
    #[error("failed to open device {}: {source}", path.display())]
    DeviceOpen {
        /// Device path
        path: PathBuf,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// Device stream reached end of file
    #[error("device stream closed")]
    DeviceClosed,

    /// Reading the device failed
    #[error("device I/O error: {0}")]
    DeviceIo(#[source] io::Error),

    /// Edge (PPS) source could not be set up
    #[error("edge source error: {message}")]
    EdgeSource {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<io::Error>,
    },

    // ===== Network Errors =====
    /// UDP socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// Reply could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    // ===== State Errors =====
    /// A background task panicked or was cancelled
    #[error("task failed: {message}")]
    TaskFailed {
        /// Description of the failure
        message: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {name} - {message}")]
    InvalidConfig {
        /// Setting name
        name: String,
        /// Why it is invalid
        message: String,
    },
}

impl GpsNtpError {
    /// Whether the server must stop. Restarting is left to the operator.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Decode(_))
    }

    /// Check if this error means the GPS device went away
    #[must_use]
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceClosed | Self::DeviceIo(_))
    }
}

/// Result type alias for time server operations
pub type Result<T> = std::result::Result<T, GpsNtpError>;
