//! Bar resolutions
//!
//! A resolution is a fixed bucket width in nanoseconds. Buckets are aligned
//! to the Unix epoch, so a 1m bar always starts on a minute boundary and a
//! coarser resolution that is a multiple of a finer one covers a whole
//! number of finer buckets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Bucket width of one cascade level.
///
/// Parsed from and rendered as `<n><unit>` with unit one of `ms`, `s`, `m`,
/// `h`, `d` (e.g. `"5s"`, `"1m"`, `"4h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution(i64);

impl Resolution {
    /// Create a resolution from a positive number of nanoseconds.
    pub fn from_nanos(nanos: i64) -> Result<Self, ValidationError> {
        if nanos <= 0 {
            return Err(ValidationError::InvalidResolution(format!("{nanos}ns")));
        }
        Ok(Self(nanos))
    }

    pub fn from_millis(millis: i64) -> Result<Self, ValidationError> {
        Self::from_nanos(millis.saturating_mul(NANOS_PER_MILLI))
    }

    pub fn from_secs(secs: i64) -> Result<Self, ValidationError> {
        Self::from_nanos(secs.saturating_mul(NANOS_PER_SECOND))
    }

    pub fn from_mins(mins: i64) -> Result<Self, ValidationError> {
        Self::from_nanos(mins.saturating_mul(NANOS_PER_MINUTE))
    }

    /// Width of one bucket in nanoseconds.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Align a timestamp to this resolution's grid (floor).
    ///
    /// Uses Euclidean division so pre-epoch timestamps floor downwards too.
    pub fn align(&self, timestamp_nanos: i64) -> i64 {
        timestamp_nanos.div_euclid(self.0) * self.0
    }

    /// Exclusive end of the bucket starting at `bucket_start`.
    pub fn bucket_end(&self, bucket_start: i64) -> i64 {
        bucket_start.saturating_add(self.0)
    }

    /// Whether this resolution is an exact multiple of `finer`.
    pub fn is_multiple_of(&self, finer: Resolution) -> bool {
        self.0 % finer.0 == 0
    }

    /// Number of buckets of this width in a 365-day year.
    pub fn periods_per_year(&self) -> f64 {
        (365 * NANOS_PER_DAY) as f64 / self.0 as f64
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_nanos(parse_duration_nanos(s)?)
    }
}

/// Parse a `<n><unit>` duration into nanoseconds. Zero is allowed here;
/// [`Resolution`] additionally requires a positive width.
pub fn parse_duration_nanos(s: &str) -> Result<i64, ValidationError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ValidationError::InvalidResolution(s.to_string()))?;
    let (digits, unit) = s.split_at(split);
    let count: i64 = digits
        .parse()
        .map_err(|_| ValidationError::InvalidResolution(s.to_string()))?;
    let unit_nanos = match unit {
        "ns" => 1,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SECOND,
        "m" => NANOS_PER_MINUTE,
        "h" => NANOS_PER_HOUR,
        "d" => NANOS_PER_DAY,
        _ => return Err(ValidationError::InvalidResolution(s.to_string())),
    };
    count
        .checked_mul(unit_nanos)
        .ok_or_else(|| ValidationError::InvalidResolution(s.to_string()))
}

/// Render nanoseconds with the largest unit that divides them exactly.
pub fn format_duration_nanos(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let units = [
        (NANOS_PER_DAY, "d"),
        (NANOS_PER_HOUR, "h"),
        (NANOS_PER_MINUTE, "m"),
        (NANOS_PER_SECOND, "s"),
        (NANOS_PER_MILLI, "ms"),
    ];
    for (unit_nanos, suffix) in units {
        if nanos % unit_nanos == 0 {
            return format!("{}{}", nanos / unit_nanos, suffix);
        }
    }
    format!("{nanos}ns")
}

impl TryFrom<String> for Resolution {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(resolution: Resolution) -> Self {
        resolution.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration_nanos(self.0))
    }
}
