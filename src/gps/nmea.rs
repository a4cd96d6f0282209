//! NMEA 0183 line framing and ZDA date/time parsing.
//!
//! The receiver emits `\r\n`-terminated sentences. [`SentenceFramer`] turns
//! raw serial chunks into complete lines; [`SentenceParser`] extracts the
//! UTC calendar second from the date/time sentence:
//!
//! ```text
//! $GPZDA,112206.00,27,10,2013,00,00*64
//!        hhmmss    dd mm yyyy
//! ```
//!
//! Fields are read at fixed character positions, so the parser also checks
//! that the separators sit where the layout expects them.

use std::ops::Range;

use bytes::{Buf, BytesMut};
use chrono::NaiveDate;
use thiserror::Error;

/// Default date/time sentence tag.
pub const DEFAULT_SENTENCE_TAG: &str = "$GPZDA";

/// Length every sentence tag must have.
pub const SENTENCE_TAG_LEN: usize = 6;

/// Line terminator used by the receiver.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Default longest line kept by the framer. NMEA sentences are at most
/// 82 characters.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

const HOUR: Range<usize> = 7..9;
const MINUTE: Range<usize> = 9..11;
const SECOND: Range<usize> = 11..13;
const DAY: Range<usize> = 17..19;
const MONTH: Range<usize> = 20..22;
const YEAR: Range<usize> = 23..27;

/// Field separators the fixed layout depends on.
const SEPARATORS: [(usize, u8); 4] = [(6, b','), (16, b','), (19, b','), (22, b',')];

/// Errors from sentence parsing. Each one drops the offending line only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Tag is not exactly six characters.
    #[error("invalid sentence tag {tag:?}: must be {SENTENCE_TAG_LEN} characters")]
    InvalidTag {
        /// The rejected tag
        tag: String,
    },

    /// Line ends before the last field.
    #[error("sentence too short: need {needed} characters, have {len}")]
    Truncated {
        /// Required length
        needed: usize,
        /// Actual length
        len: usize,
    },

    /// A separator is missing from its fixed position.
    #[error("unexpected {found:?} at position {position}, expected ','")]
    Layout {
        /// Byte offset in the line
        position: usize,
        /// Character found there
        found: char,
    },

    /// Field contains something other than ASCII digits.
    #[error("invalid {field} field: {value:?}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Raw field text
        value: String,
    },

    /// Field parsed but is not a valid calendar value.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Parsed value
        value: u32,
    },

    /// `*hh` checksum does not match the sentence body.
    #[error("checksum mismatch: sentence says {expected:02X}, computed {actual:02X}")]
    Checksum {
        /// Checksum carried by the sentence
        expected: u8,
        /// Checksum computed over the body
        actual: u8,
    },
}

/// UTC calendar second reported by one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarSample {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    epoch_seconds: i64,
}

impl CalendarSample {
    /// Validate a calendar second and compute its Unix time.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutOfRange`] for an impossible date or time.
    /// Second 60 is rejected: leap seconds are not modelled.
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self, ParseError> {
        for (field, value, limit) in [
            ("month", month, 13),
            ("hour", hour, 24),
            ("minute", minute, 60),
            ("second", second, 60),
        ] {
            if value >= limit || (field == "month" && value == 0) {
                return Err(ParseError::OutOfRange { field, value });
            }
        }
        let epoch_seconds = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or(ParseError::OutOfRange {
                field: "day",
                value: day,
            })?
            .and_utc()
            .timestamp();

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            epoch_seconds,
        })
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub fn epoch_seconds(&self) -> i64 {
        self.epoch_seconds
    }

    /// Year
    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month (1-12)
    #[must_use]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Day of month
    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    /// Hour (0-23)
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Minute
    #[must_use]
    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Second
    #[must_use]
    pub fn second(&self) -> u32 {
        self.second
    }
}

impl std::fmt::Display for CalendarSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Splits a serial byte stream into `\r\n`-terminated lines.
///
/// Sans-IO: [`feed`](Self::feed) raw chunks as they are read, then drain
/// [`next_line`](Self::next_line) until it returns `None`. A partial line
/// stays buffered until its terminator arrives. Lines longer than the limit
/// are dropped whole, including the part that arrives after the limit was
/// hit.
#[derive(Debug)]
pub struct SentenceFramer {
    buffer: BytesMut,
    max_line_len: usize,
    /// Inside an over-long line; drop everything up to the next terminator.
    discarding: bool,
    discarded: u64,
}

impl SentenceFramer {
    /// Create a framer with [`DEFAULT_MAX_LINE_LEN`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a framer that drops lines longer than `max_line_len` bytes.
    #[must_use]
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            max_line_len: max_line_len.max(1),
            discarding: false,
            discarded: 0,
        }
    }

    /// Append bytes read from the device.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete line, without its terminator.
    ///
    /// Invalid UTF-8 is replaced lossily; such lines fail to parse later.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = find_terminator(&self.buffer) else {
                self.trim_overlong();
                return None;
            };

            let line = self.buffer.split_to(pos);
            self.buffer.advance(LINE_TERMINATOR.len());

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line_len {
                self.discarded += 1;
                tracing::debug!(len = line.len(), "dropping over-long NMEA line");
                continue;
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Bytes currently buffered (an incomplete line).
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of over-long lines dropped so far.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn trim_overlong(&mut self) {
        if self.buffer.len() <= self.max_line_len {
            return;
        }
        // Keep a trailing '\r': it may be the first half of the terminator.
        let keep = usize::from(self.buffer.last() == Some(&LINE_TERMINATOR[0]));
        let drop_len = self.buffer.len() - keep;
        self.buffer.advance(drop_len);
        if !self.discarding {
            self.discarding = true;
            self.discarded += 1;
            tracing::debug!("dropping over-long NMEA line");
        }
    }
}

impl Default for SentenceFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_TERMINATOR.len())
        .position(|w| w == LINE_TERMINATOR)
}

/// Extracts [`CalendarSample`]s from one class of date/time sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceParser {
    tag: String,
}

impl SentenceParser {
    /// Parser for [`DEFAULT_SENTENCE_TAG`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            tag: DEFAULT_SENTENCE_TAG.to_string(),
        }
    }

    /// Parser for another talker's ZDA sentence, e.g. `$GNZDA`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidTag`] unless `tag` is six characters.
    pub fn with_tag(tag: impl Into<String>) -> Result<Self, ParseError> {
        let tag = tag.into();
        if !Self::is_valid_tag(&tag) {
            return Err(ParseError::InvalidTag { tag });
        }
        Ok(Self { tag })
    }

    /// Whether `tag` can be used as a sentence tag.
    #[must_use]
    pub fn is_valid_tag(tag: &str) -> bool {
        tag.len() == SENTENCE_TAG_LEN && tag.is_ascii()
    }

    /// The tag this parser recognizes.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Parse one complete line.
    ///
    /// Returns `Ok(None)` for sentences of any other class.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if a recognized sentence is malformed.
    pub fn parse(&self, line: &str) -> Result<Option<CalendarSample>, ParseError> {
        if !line.starts_with(self.tag.as_str()) {
            return Ok(None);
        }
        let body = strip_checksum(line)?;
        let bytes = body.as_bytes();
        if bytes.len() < YEAR.end {
            return Err(ParseError::Truncated {
                needed: YEAR.end,
                len: bytes.len(),
            });
        }
        for (position, expected) in SEPARATORS {
            if bytes[position] != expected {
                return Err(ParseError::Layout {
                    position,
                    found: char::from(bytes[position]),
                });
            }
        }

        let year = digits(body, YEAR, "year")?;
        let sample = CalendarSample::new(
            i32::try_from(year).map_err(|_| ParseError::OutOfRange {
                field: "year",
                value: year,
            })?,
            digits(body, MONTH, "month")?,
            digits(body, DAY, "day")?,
            digits(body, HOUR, "hour")?,
            digits(body, MINUTE, "minute")?,
            digits(body, SECOND, "second")?,
        )?;
        Ok(Some(sample))
    }
}

impl Default for SentenceParser {
    fn default() -> Self {
        Self::new()
    }
}

fn digits(body: &str, range: Range<usize>, field: &'static str) -> Result<u32, ParseError> {
    let invalid = || ParseError::InvalidField {
        field,
        value: String::from_utf8_lossy(&body.as_bytes()[range.clone()]).into_owned(),
    };
    let text = body.get(range.clone()).ok_or_else(invalid)?;
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse().map_err(|_| invalid())
}

/// Verify an optional `*hh` suffix and return the sentence without it.
fn strip_checksum(line: &str) -> Result<&str, ParseError> {
    let Some(star) = line.rfind('*') else {
        return Ok(line);
    };
    let (body, suffix) = (&line[..star], &line[star + 1..]);
    let expected = (suffix.len() == 2)
        .then(|| u8::from_str_radix(suffix, 16).ok())
        .flatten()
        .ok_or_else(|| ParseError::InvalidField {
            field: "checksum",
            value: suffix.to_string(),
        })?;
    let actual = nmea_checksum(body);
    if actual != expected {
        return Err(ParseError::Checksum { expected, actual });
    }
    Ok(body)
}

/// XOR of every byte after the leading `$` (or `!`).
#[must_use]
pub fn nmea_checksum(sentence: &str) -> u8 {
    sentence
        .trim_start_matches(['$', '!'])
        .bytes()
        .fold(0, |acc, b| acc ^ b)
}
