//! UDP time responder.
//!
//! Answers each well-formed request with a reply stamped from the
//! disciplined clock (`local now + published offset`). Until the first
//! offset sample exists, requests are read and dropped unanswered.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::config::ReplyFields;
use crate::clock::{SharedClock, WallClock};
use crate::error::{GpsNtpError, Result};
use crate::gps::estimator::{OffsetReader, OffsetSample};
use crate::protocol::ntp::{NtpPacket, NtpTimestamp};

/// Counters kept by the responder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    /// Replies built
    pub served: u64,
    /// Datagrams that failed to decode
    pub malformed: u64,
    /// Requests dropped because no offset was published yet
    pub premature: u64,
    /// Replies that could not be sent
    pub send_failures: u64,
}

/// Build the reply to `request` using `sample`.
///
/// Receive and transmit times each read `clock` once, so the transmit time
/// is never earlier than the receive time.
#[must_use]
pub fn build_reply(
    request: &NtpPacket,
    sample: &OffsetSample,
    clock: &dyn WallClock,
    fields: &ReplyFields,
) -> NtpPacket {
    let receive_time = NtpTimestamp::from_unix_nanos(sample.apply(clock.now()));
    let reference_time = NtpTimestamp::from_unix_seconds(sample.edge_time().as_secs());

    NtpPacket {
        leap_indicator: fields.leap_indicator,
        status: fields.status,
        packet_type: fields.packet_type,
        precision: fields.precision,
        estimated_error: fields.estimated_error,
        estimated_drift_rate: fields.estimated_drift_rate,
        reference_clock_id: fields.reference_clock_id,
        reference_time,
        originate_time: request.transmit_time,
        receive_time,
        transmit_time: NtpTimestamp::from_unix_nanos(sample.apply(clock.now())),
    }
}

/// Serving loop over one UDP socket.
pub struct TimeResponder {
    socket: UdpSocket,
    offsets: OffsetReader,
    clock: SharedClock,
    fields: ReplyFields,
    recv_buf_size: usize,
    stats: ResponderStats,
}

impl TimeResponder {
    /// Create a responder on a bound socket.
    #[must_use]
    pub fn new(
        socket: UdpSocket,
        offsets: OffsetReader,
        clock: SharedClock,
        fields: ReplyFields,
        recv_buf_size: usize,
    ) -> Self {
        Self {
            socket,
            offsets,
            clock,
            fields,
            recv_buf_size: recv_buf_size.max(NtpPacket::SIZE),
            stats: ResponderStats::default(),
        }
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> ResponderStats {
        self.stats
    }

    /// Serve until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`GpsNtpError::Network`] if receiving fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ResponderStats> {
        let mut buf = vec![0u8; self.recv_buf_size];
        tracing::info!(
            local_addr = ?self.socket.local_addr().ok(),
            "time responder listening"
        );

        loop {
            let (len, src) = tokio::select! {
                () = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::error!(error = %e, "time responder receive failed");
                        return Err(GpsNtpError::Network(e));
                    }
                },
            };

            let Some(reply) = self.respond(&buf[..len], src) else {
                continue;
            };
            if let Err(e) = self.socket.send_to(&reply, src).await {
                self.stats.send_failures += 1;
                tracing::warn!(%src, error = %e, "failed to send reply");
            }
        }

        tracing::info!(
            served = self.stats.served,
            malformed = self.stats.malformed,
            premature = self.stats.premature,
            send_failures = self.stats.send_failures,
            "time responder stopped"
        );
        Ok(self.stats)
    }

    /// Handle one datagram, returning the encoded reply if one is due.
    pub fn respond(&mut self, datagram: &[u8], src: SocketAddr) -> Option<[u8; NtpPacket::SIZE]> {
        let request = match NtpPacket::decode(datagram) {
            Ok(request) => request,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!(%src, error = %e, "dropping malformed request");
                return None;
            }
        };

        let Some(sample) = self.offsets.current() else {
            self.stats.premature += 1;
            tracing::debug!(%src, "clock not disciplined yet, request dropped");
            return None;
        };

        let reply = build_reply(&request, &sample, self.clock.as_ref(), &self.fields);
        self.stats.served += 1;
        tracing::debug!(
            %src,
            originate = %reply.originate_time,
            transmit = %reply.transmit_time,
            "serving request"
        );
        Some(reply.encode())
    }
}

impl std::fmt::Debug for TimeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeResponder")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("fields", &self.fields)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
