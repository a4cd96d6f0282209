//! NTP timestamp representation and conversions.
//!
//! Protocol timestamps are a pair of 32-bit words: whole seconds since the
//! protocol epoch (1900-01-01) and a binary fraction of a second
//! (`fraction / 2^32`). Local instants are handled as nanoseconds since the
//! Unix epoch, which keeps offset arithmetic exact.

use std::time::Duration;

/// Seconds between the protocol epoch (1900-01-01) and the Unix epoch.
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// `2^32` as a float, the scale of the fraction word.
const FRACTION_SCALE: f64 = 4_294_967_296.0;

/// Protocol timestamp: seconds since 1900-01-01 plus a 1/2^32 s fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NtpTimestamp {
    /// Seconds since the protocol epoch.
    pub seconds: u32,
    /// Fractional seconds (1/2^32 of a second).
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Zero timestamp.
    pub const ZERO: Self = Self {
        seconds: 0,
        fraction: 0,
    };

    /// Create a timestamp from its two wire words.
    #[must_use]
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Convert signed nanoseconds since the Unix epoch.
    ///
    /// The seconds word wraps modulo 2^32 the same way the wire format does
    /// at an era boundary.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "seconds wrap into the 32-bit era field; sub-second part is in 0..1e9"
    )]
    pub fn from_unix_nanos(nanos: i128) -> Self {
        let total = nanos + i128::from(NTP_UNIX_OFFSET) * NANOS_PER_SEC;
        let seconds = total.div_euclid(NANOS_PER_SEC);
        let sub_nanos = total.rem_euclid(NANOS_PER_SEC);
        Self {
            seconds: seconds as u32,
            fraction: nanos_to_fraction(sub_nanos as u32),
        }
    }

    /// Convert a duration since the Unix epoch.
    #[must_use]
    pub fn from_unix(since_epoch: Duration) -> Self {
        Self::from_unix_nanos(i128::try_from(since_epoch.as_nanos()).unwrap_or(i128::MAX))
    }

    /// Whole Unix seconds, fraction zero.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "seconds wrap into the 32-bit era field"
    )]
    pub fn from_unix_seconds(seconds: u64) -> Self {
        Self {
            seconds: seconds.wrapping_add(NTP_UNIX_OFFSET) as u32,
            fraction: 0,
        }
    }

    /// Nanoseconds since the Unix epoch, assuming era 0.
    #[must_use]
    pub fn to_unix_nanos(&self) -> i128 {
        (i128::from(self.seconds) - i128::from(NTP_UNIX_OFFSET)) * NANOS_PER_SEC
            + i128::from(fraction_to_nanos(self.fraction))
    }

    /// Protocol seconds as a float.
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + fraction_to_secs(self.fraction)
    }

    /// Encode to 8 bytes (big-endian seconds, then fraction).
    #[must_use]
    pub fn encode(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        buf[4..8].copy_from_slice(&self.fraction.to_be_bytes());
        buf
    }

    /// Decode from 8 bytes. Returns `None` if the slice is too short.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            seconds: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            fraction: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

impl std::fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, fraction_to_nanos(self.fraction))
    }
}

/// Nanoseconds within a second (`0..1_000_000_000`) to a fraction word.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    reason = "(n << 32) / 1e9 < 2^32 for n < 1e9"
)]
pub fn nanos_to_fraction(nanos: u32) -> u32 {
    let nanos = u64::from(nanos.min(999_999_999));
    ((nanos << 32) / 1_000_000_000) as u32
}

/// Fraction word to nanoseconds within the second (rounded down).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    reason = "(f * 1e9) >> 32 < 1e9 for any u32 fraction"
)]
pub fn fraction_to_nanos(fraction: u32) -> u32 {
    ((u64::from(fraction) * 1_000_000_000) >> 32) as u32
}

/// Fraction word as seconds. Exact: every `u32` fits in an `f64` mantissa.
#[must_use]
pub fn fraction_to_secs(fraction: u32) -> f64 {
    f64::from(fraction) / FRACTION_SCALE
}

/// Sub-second part of `secs` as a fraction word.
///
/// Inverse of [`fraction_to_secs`]; values outside `[0, 1)` saturate.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "float to int casts saturate, input is clamped first"
)]
pub fn secs_to_fraction(secs: f64) -> u32 {
    (secs.clamp(0.0, 1.0) * FRACTION_SCALE).floor().min(f64::from(u32::MAX)) as u32
}
