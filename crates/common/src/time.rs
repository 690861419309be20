//! Block time helpers.
//!
//! The engine never reads a wall clock. Time only enters through the block
//! timestamps handed to it, carried as [`Timestamp`] (unix nanoseconds).
//! Proposal terms use whole unix seconds.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Unix timestamp in nanoseconds.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub const fn from_unix(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Whole seconds, truncated.
    pub const fn unix(self) -> i64 {
        self.0.div_euclid(NANOS_PER_SEC)
    }

    pub const fn unix_nanos(self) -> i64 {
        self.0
    }

    pub fn add(self, d: Duration) -> Timestamp {
        let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(nanos))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}.{:09})", self.unix(), self.0.rem_euclid(NANOS_PER_SEC))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("unknown unit in duration {0:?}")]
    UnknownUnit(String),
}

/// Parses durations in the `48h`, `30m`, `1h30m15s`, `500ms` style used by
/// network parameters.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(DurationParseError::Invalid(s.to_string()));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| DurationParseError::Invalid(s.to_string()))?;
        rest = &rest[digits..];

        let unit_len = rest.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            "us" => Duration::from_micros(value),
            "ns" => Duration::from_nanos(value),
            _ => return Err(DurationParseError::UnknownUnit(s.to_string())),
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}
