//! Time server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{GpsNtpError, Result};
use crate::gps::estimator::DEFAULT_MAX_EDGE_AGE;
use crate::gps::ingest::DEFAULT_READ_TIMEOUT;
use crate::gps::nmea::{DEFAULT_SENTENCE_TAG, SentenceParser};
use crate::protocol::ntp::NTP_PORT;

/// Receive buffer for inbound datagrams.
pub const DEFAULT_RECV_BUF_SIZE: usize = 1024;

/// Fixed header fields stamped on every reply.
///
/// These are placeholders describing a GPS reference clock, not measured
/// quality metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFields {
    /// Leap indicator (default: 0, no warning)
    pub leap_indicator: u8,
    /// Status (default: 28)
    pub status: u8,
    /// Packet type (default: 1)
    pub packet_type: u8,
    /// Precision (default: 236)
    pub precision: u16,
    /// Estimated error (default: 648)
    pub estimated_error: u32,
    /// Estimated drift rate (default: 440)
    pub estimated_drift_rate: u32,
    /// Reference clock identifier (default: `"GPS\0"`)
    pub reference_clock_id: u32,
}

impl ReplyFields {
    /// `"GPS\0"` as a big-endian word.
    pub const GPS_REFERENCE_ID: u32 = u32::from_be_bytes(*b"GPS\0");
}

impl Default for ReplyFields {
    fn default() -> Self {
        Self {
            leap_indicator: 0,
            status: 28,
            packet_type: 1,
            precision: 236,
            estimated_error: 648,
            estimated_drift_rate: 440,
            reference_clock_id: Self::GPS_REFERENCE_ID,
        }
    }
}

/// Configuration for [`TimeServer`](super::TimeServer)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP listen address (default: `0.0.0.0:123`)
    pub bind_addr: SocketAddr,

    /// Datagram receive buffer in bytes (default: 1024)
    pub recv_buf_size: usize,

    /// Bound on a single device read (default: 1 second)
    pub read_timeout: Duration,

    /// Oldest edge a sentence may pair with (default: 2 seconds)
    pub max_edge_age: Duration,

    /// Date/time sentence tag (default: `$GPZDA`)
    pub sentence_tag: String,

    /// Header fields stamped on replies
    pub reply: ReplyFields,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, NTP_PORT)),
            recv_buf_size: DEFAULT_RECV_BUF_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_edge_age: DEFAULT_MAX_EDGE_AGE,
            sentence_tag: DEFAULT_SENTENCE_TAG.to_string(),
            reply: ReplyFields::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Check values that would make the server misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::InvalidConfig`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        if !SentenceParser::is_valid_tag(&self.sentence_tag) {
            return Err(invalid(
                "sentence_tag",
                format!(
                    "{:?} is not a 6-character ASCII tag",
                    self.sentence_tag
                ),
            ));
        }
        if self.recv_buf_size == 0 {
            return Err(invalid("recv_buf_size", "must be non-zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(invalid("read_timeout", "must be non-zero"));
        }
        if self.max_edge_age.is_zero() {
            return Err(invalid("max_edge_age", "must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(name: &str, message: impl Into<String>) -> GpsNtpError {
    GpsNtpError::InvalidConfig {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set listen address
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set datagram receive buffer size
    #[must_use]
    pub fn recv_buf_size(mut self, size: usize) -> Self {
        self.config.recv_buf_size = size;
        self
    }

    /// Set device read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set edge pairing window
    #[must_use]
    pub fn max_edge_age(mut self, age: Duration) -> Self {
        self.config.max_edge_age = age;
        self
    }

    /// Set date/time sentence tag (e.g. `$GNZDA`)
    #[must_use]
    pub fn sentence_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.sentence_tag = tag.into();
        self
    }

    /// Set reply header fields
    #[must_use]
    pub fn reply(mut self, reply: ReplyFields) -> Self {
        self.config.reply = reply;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
