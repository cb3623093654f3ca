//! Human-readable duration formatting and parsing utilities
//!
//! Accepts the duration syntax used by Kubernetes resources: an optional sign
//! followed by one or more `<decimal><unit>` pairs, e.g. `"24h"`, `"1h30m"`,
//! `"1.5h"`, `"-10s"`. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m`
//! and `h`. A bare `"0"` is the only unit-less value accepted.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Fraction digits beyond nanosecond precision carry no information
const MAX_FRACTION_DIGITS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0:?}")]
    InvalidFormat(String),

    #[error("Missing unit in duration: {0:?}")]
    MissingUnit(String),

    #[error("Invalid unit {unit:?} in duration {input:?}")]
    InvalidUnit { unit: String, input: String },

    #[error("Duration out of range: {0:?}")]
    Overflow(String),
}

/// Signed duration wrapper with human-readable parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub TimeDelta);

impl HumanDuration {
    pub fn from_secs(secs: i64) -> Self {
        HumanDuration(TimeDelta::seconds(secs))
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    /// True when the duration is strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > TimeDelta::zero()
    }

    /// Convert to a std duration; `None` for negative values
    pub fn to_std(&self) -> Option<std::time::Duration> {
        self.0.to_std().ok()
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();

        let (negative, mut rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        if rest == "0" {
            return Ok(HumanDuration(TimeDelta::zero()));
        }
        if rest.is_empty() {
            return Err(ParseError::InvalidFormat(input.to_string()));
        }

        let mut total: u128 = 0;
        while !rest.is_empty() {
            let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (int_part, after_int) = rest.split_at(int_len);

            let (frac_part, after_number) = match after_int.strip_prefix('.') {
                Some(tail) => {
                    let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                    tail.split_at(frac_len)
                }
                None => ("", after_int),
            };

            if int_part.is_empty() && frac_part.is_empty() {
                return Err(ParseError::InvalidFormat(input.to_string()));
            }

            let unit_len = after_number
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(after_number.len());
            let (unit, tail) = after_number.split_at(unit_len);
            if unit.is_empty() {
                return Err(ParseError::MissingUnit(input.to_string()));
            }

            let scale = unit_nanos(unit).ok_or_else(|| ParseError::InvalidUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

            let overflow = || ParseError::Overflow(input.to_string());

            let whole: u128 = if int_part.is_empty() {
                0
            } else {
                int_part.parse().map_err(|_| overflow())?
            };
            let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;

            if !frac_part.is_empty() {
                let digits = (frac_part.len() as u32).min(MAX_FRACTION_DIGITS);
                let frac: u128 = frac_part[..digits as usize]
                    .parse()
                    .map_err(|_| overflow())?;
                value = value
                    .checked_add(frac * scale / 10u128.pow(digits))
                    .ok_or_else(overflow)?;
            }

            total = total.checked_add(value).ok_or_else(overflow)?;
            if total > i64::MAX as u128 {
                return Err(overflow());
            }

            rest = tail;
        }

        let nanos = total as i64;
        let nanos = if negative { -nanos } else { nanos };
        Ok(HumanDuration(TimeDelta::nanoseconds(nanos)))
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // TimeDelta is bounded by i64 milliseconds, so i128 nanoseconds always fit
        let nanos = self.0.num_seconds() as i128 * NANOS_PER_SECOND as i128
            + self.0.subsec_nanos() as i128;
        if nanos == 0 {
            return f.write_str("0s");
        }
        if nanos < 0 {
            f.write_str("-")?;
        }
        let nanos = nanos.unsigned_abs();

        if nanos < NANOS_PER_SECOND {
            return if nanos % NANOS_PER_MILLI == 0 {
                write!(f, "{}ms", nanos / NANOS_PER_MILLI)
            } else if nanos % NANOS_PER_MICRO == 0 {
                write!(f, "{}us", nanos / NANOS_PER_MICRO)
            } else {
                write!(f, "{}ns", nanos)
            };
        }

        let hours = nanos / NANOS_PER_HOUR;
        let minutes = nanos % NANOS_PER_HOUR / NANOS_PER_MINUTE;
        let seconds = nanos % NANOS_PER_MINUTE / NANOS_PER_SECOND;
        let subsec = nanos % NANOS_PER_SECOND;

        if hours > 0 {
            write!(f, "{}h", hours)?;
        }
        if minutes > 0 {
            write!(f, "{}m", minutes)?;
        }
        if subsec > 0 {
            let frac = format!("{:09}", subsec);
            write!(f, "{}.{}s", seconds, frac.trim_end_matches('0'))?;
        } else if seconds > 0 {
            write!(f, "{}s", seconds)?;
        }
        Ok(())
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"30s\", \"24h\") or seconds as integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                i64::try_from(v)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .map(HumanDuration)
                    .ok_or_else(|| E::custom(format!("duration of {v} seconds is out of range")))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                TimeDelta::try_seconds(v)
                    .map(HumanDuration)
                    .ok_or_else(|| E::custom(format!("duration of {v} seconds is out of range")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}
