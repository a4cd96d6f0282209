//! Time-protocol wire format.
//!
//! A fixed 48-byte packet carrying four timestamp pairs. The server fills
//! receive and transmit times from the GPS-disciplined clock and echoes the
//! client's transmit time as the originate time:
//!
//! ```text
//! Client                          Server
//!   |--- request (transmit=T1) ---->|  (server stamps receive=T2)
//!   |<-- reply (orig=T1, T2, T3) ---|  (server stamps transmit=T3)
//! ```

pub mod packet;
pub mod timestamp;

#[cfg(test)]
mod tests;

pub use packet::{DecodeError, NtpPacket};
pub use timestamp::{
    NTP_UNIX_OFFSET, NtpTimestamp, fraction_to_nanos, fraction_to_secs, nanos_to_fraction,
    secs_to_fraction,
};

/// Default server port.
pub const NTP_PORT: u16 = 123;
