//! 48-byte time-protocol packet codec.
//!
//! Layout (big-endian):
//!
//! ```text
//!  0       1       2               4
//! +-------+-------+---------------+
//! |LI|Stat| Type  |   Precision   |
//! +-------+-------+---------------+
//! |        Estimated error        |  4
//! |     Estimated drift rate      |  8
//! |  Reference clock identifier   | 12
//! |   Reference time (int, frac)  | 16
//! |   Originate time (int, frac)  | 24
//! |    Receive time (int, frac)   | 32
//! |   Transmit time (int, frac)   | 40
//! +-------------------------------+ 48
//! ```
//!
//! Byte 0 packs a 2-bit leap indicator with a 6-bit status field. This folds
//! what RFC 5905 splits into version and mode; the layout is kept as-is
//! because the peer is this project's own query tool.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::timestamp::NtpTimestamp;

/// Errors from [`NtpPacket::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than a full packet.
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Required length
        needed: usize,
        /// Actual length
        have: usize,
    },

    /// Length is not a whole number of 32-bit words.
    #[error("packet length {len} is not a multiple of 4")]
    Misaligned {
        /// Actual length
        len: usize,
    },
}

/// Time-protocol packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpPacket {
    /// Leap indicator (2 bits). 0 = no pending leap second.
    pub leap_indicator: u8,
    /// Status (6 bits).
    pub status: u8,
    /// Packet type.
    pub packet_type: u8,
    /// Precision.
    pub precision: u16,
    /// Estimated error.
    pub estimated_error: u32,
    /// Estimated drift rate.
    pub estimated_drift_rate: u32,
    /// Reference clock identifier (four ASCII bytes for a primary source).
    pub reference_clock_id: u32,
    /// Start of the last disciplined second.
    pub reference_time: NtpTimestamp,
    /// Client transmit time, echoed back by the server.
    pub originate_time: NtpTimestamp,
    /// Server receive time.
    pub receive_time: NtpTimestamp,
    /// Transmit time of whoever sent this packet.
    pub transmit_time: NtpTimestamp,
}

impl NtpPacket {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

    /// Mask for the leap indicator after shifting.
    pub const LEAP_MASK: u8 = 0b11;

    /// Mask for the status field.
    pub const STATUS_MASK: u8 = 0b11_1111;

    /// First byte of a query-tool request (LI 0, status 27).
    pub const CLIENT_REQUEST_BYTE0: u8 = 0x1b;

    /// Build the request the query tool sends: first byte `0x1b`, transmit
    /// time set to the send instant, everything else zero.
    #[must_use]
    pub fn client_request(transmit_time: NtpTimestamp) -> Self {
        Self {
            leap_indicator: (Self::CLIENT_REQUEST_BYTE0 >> 6) & Self::LEAP_MASK,
            status: Self::CLIENT_REQUEST_BYTE0 & Self::STATUS_MASK,
            transmit_time,
            ..Self::default()
        }
    }

    /// Decode a packet.
    ///
    /// Inputs longer than [`Self::SIZE`] are accepted if word-aligned; only
    /// the first 48 bytes are read. Field values are never validated.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if `data` is shorter than 48 bytes or its
    /// length is not a multiple of 4.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::SIZE {
            return Err(DecodeError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        if data.len() % 4 != 0 {
            return Err(DecodeError::Misaligned { len: data.len() });
        }

        let timestamp = |at: usize| {
            NtpTimestamp::decode(&data[at..]).ok_or(DecodeError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            })
        };

        Ok(Self {
            leap_indicator: (data[0] >> 6) & Self::LEAP_MASK,
            status: data[0] & Self::STATUS_MASK,
            packet_type: data[1],
            precision: BigEndian::read_u16(&data[2..4]),
            estimated_error: BigEndian::read_u32(&data[4..8]),
            estimated_drift_rate: BigEndian::read_u32(&data[8..12]),
            reference_clock_id: BigEndian::read_u32(&data[12..16]),
            reference_time: timestamp(16)?,
            originate_time: timestamp(24)?,
            receive_time: timestamp(32)?,
            transmit_time: timestamp(40)?,
        })
    }

    /// Encode to exactly 48 bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = ((self.leap_indicator & Self::LEAP_MASK) << 6) | (self.status & Self::STATUS_MASK);
        buf[1] = self.packet_type;
        BigEndian::write_u16(&mut buf[2..4], self.precision);
        BigEndian::write_u32(&mut buf[4..8], self.estimated_error);
        BigEndian::write_u32(&mut buf[8..12], self.estimated_drift_rate);
        BigEndian::write_u32(&mut buf[12..16], self.reference_clock_id);
        for (at, ts) in [
            (16, self.reference_time),
            (24, self.originate_time),
            (32, self.receive_time),
            (40, self.transmit_time),
        ] {
            buf[at..at + NtpTimestamp::SIZE].copy_from_slice(&ts.encode());
        }
        buf
    }

    /// Reference clock identifier as text, trailing NULs stripped.
    ///
    /// Non-printable bytes are rendered as `.`.
    #[must_use]
    pub fn reference_id_tag(&self) -> String {
        self.reference_clock_id
            .to_be_bytes()
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            })
            .collect()
    }
}
