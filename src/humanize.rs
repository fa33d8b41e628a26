//! Byte size parsing and formatting for chunk sizes and transfer progress

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows u64: {0}")]
    Overflow(String),
}

const UNITS: &[(&str, u64)] = &[
    ("B", 1),
    ("KB", 1024),
    ("MB", 1024 * 1024),
    ("GB", 1024 * 1024 * 1024),
    ("TB", 1024 * 1024 * 1024 * 1024),
];

/// Byte count that reads and writes as "512KB", "4MB" and friends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn kib(n: u64) -> Self {
        ByteSize(n * 1024)
    }

    pub const fn mib(n: u64) -> Self {
        ByteSize(n * 1024 * 1024)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Largest unit that divides the value exactly, so the output parses back
    fn exact_unit(&self) -> (&'static str, u64) {
        UNITS
            .iter()
            .rev()
            .find(|(_, divisor)| self.0 >= *divisor && self.0 % divisor == 0)
            .map(|&(unit, divisor)| (unit, divisor))
            .unwrap_or(("B", 1))
    }

    /// One-decimal rendering for user-facing progress ("1.5MB")
    pub fn to_human_readable(&self) -> String {
        let Some(&(unit, divisor)) = UNITS.iter().rev().find(|(_, d)| self.0 >= *d) else {
            return format!("{}B", self.0);
        };

        let whole = self.0 / divisor;
        let tenth = (self.0 % divisor) * 10 / divisor;
        if tenth == 0 || divisor == 1 {
            format!("{}{}", whole, unit)
        } else {
            format!("{}.{}{}", whole, tenth, unit)
        }
    }
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let (unit, divisor) = self.exact_unit();
        serializer.serialize_str(&format!("{}{}", self.0 / divisor, unit))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl<'de> serde::de::Visitor<'de> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"512KB\", \"4MB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("negative byte size: {v}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if let Ok(num) = s.parse::<u64>() {
            return Ok(ByteSize(num));
        }

        let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) else {
            return Err(ParseError::InvalidFormat(s));
        };
        if pos == 0 {
            return Err(ParseError::InvalidFormat(s));
        }
        let (num_str, unit) = s.split_at(pos);

        let num: u64 = num_str.parse()?;

        let multiplier: u64 = match unit.trim() {
            "B" => 1,
            "K" | "KB" | "KIB" => 1024,
            "M" | "MB" | "MIB" => 1024 * 1024,
            "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
            "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or(ParseError::Overflow(s))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

/// Whole-percent progress, clamped to 100; an empty file counts as complete
pub fn percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(transferred) * 100 / u128::from(total)).min(100);
    pct as u8
}

/// "1.5MB of 4MB (37%)"
pub fn describe_progress(transferred: u64, total: u64) -> String {
    format!(
        "{} of {} ({}%)",
        ByteSize(transferred),
        ByteSize(total),
        percent(transferred, total)
    )
}
