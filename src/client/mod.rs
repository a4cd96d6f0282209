//! One-shot time query.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # async fn example() -> gpsntp::Result<()> {
//! let server = "127.0.0.1:123".parse().unwrap();
//! let result = gpsntp::client::query(server, Duration::from_secs(2)).await?;
//! println!("server time: {}", result.reply.transmit_time);
//! println!("offset: {:.6}s", result.clock_offset_secs());
//! # Ok(())
//! # }
//! ```


use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::clock::{SystemClock, WallClock};
use crate::error::{GpsNtpError, Result};
use crate::protocol::ntp::{NtpPacket, NtpTimestamp};

/// A decoded reply and the local instants around the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    /// Server address that answered
    pub server: SocketAddr,
    /// Decoded reply
    pub reply: NtpPacket,
    /// Local send time (also sent as the request's transmit time)
    pub sent_at: NtpTimestamp,
    /// Local receive time
    pub received_at: NtpTimestamp,
}

impl QueryResult {
    /// Server clock minus local clock, in seconds.
    ///
    /// offset = ((t2 - t1) + (t3 - t4)) / 2
    #[must_use]
    pub fn clock_offset_secs(&self) -> f64 {
        let t1 = self.sent_at.as_secs_f64();
        let t2 = self.reply.receive_time.as_secs_f64();
        let t3 = self.reply.transmit_time.as_secs_f64();
        let t4 = self.received_at.as_secs_f64();
        ((t2 - t1) + (t3 - t4)) / 2.0
    }

    /// Round-trip network delay, in seconds.
    ///
    /// delay = (t4 - t1) - (t3 - t2)
    #[must_use]
    pub fn round_trip_secs(&self) -> f64 {
        let t1 = self.sent_at.as_secs_f64();
        let t2 = self.reply.receive_time.as_secs_f64();
        let t3 = self.reply.transmit_time.as_secs_f64();
        let t4 = self.received_at.as_secs_f64();
        (t4 - t1) - (t3 - t2)
    }
}

/// Query `server` once using the system clock.
///
/// # Errors
///
/// See [`query_with_clock`].
pub async fn query(server: SocketAddr, timeout: Duration) -> Result<QueryResult> {
    query_with_clock(server, timeout, &SystemClock).await
}

/// Query `server` once, stamping the exchange with `clock`.
///
/// # Errors
///
/// Returns [`GpsNtpError::Timeout`] if no reply arrives within `timeout`,
/// [`GpsNtpError::Decode`] if the reply is malformed, and
/// [`GpsNtpError::Network`] on socket errors.
pub async fn query_with_clock(
    server: SocketAddr,
    timeout: Duration,
    clock: &dyn WallClock,
) -> Result<QueryResult> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;

    let sent_at = NtpTimestamp::from_unix(clock.now());
    let request = NtpPacket::client_request(sent_at);
    socket.send(&request.encode()).await?;
    tracing::debug!(%server, transmit = %sent_at, "sent time request");

    let mut buf = [0u8; 1024];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| GpsNtpError::Timeout)??;
    let received_at = NtpTimestamp::from_unix(clock.now());
    let reply = NtpPacket::decode(&buf[..len])?;
    tracing::debug!(%server, transmit = %reply.transmit_time, "received time reply");

    Ok(QueryResult {
        server,
        reply,
        sent_at,
        received_at,
    })
}
