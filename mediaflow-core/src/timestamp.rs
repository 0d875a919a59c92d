//! Timestamps tied to a time base.
//!
//! Packets and frames carry bare `i64` timestamps next to a `time_base`
//! field. [`Timestamp`] pairs the two whenever values from different streams
//! have to be compared, e.g. for interleaving or time-based seeking.

use std::cmp::Ordering;
use std::fmt;

use crate::rational::Rational;

/// A timestamp with an associated time base.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    /// Raw value in `time_base` units.
    pub value: i64,
    /// Units of `value`, in seconds per tick.
    pub time_base: Rational,
}

impl Timestamp {
    pub fn new(value: i64, time_base: Rational) -> Self {
        Self { value, time_base }
    }

    /// Timestamp from seconds, rounded to the nearest tick of `time_base`.
    pub fn from_seconds(seconds: f64, time_base: Rational) -> Self {
        let value = (seconds * time_base.den as f64 / time_base.num as f64).round() as i64;
        Self { value, time_base }
    }

    /// Timestamp from microseconds.
    pub fn from_micros(us: i64) -> Self {
        Self::new(us, Rational::MICROS)
    }

    /// Convert to a different time base.
    pub fn rescale(&self, target: Rational) -> Self {
        Self {
            value: self.time_base.rescale(self.value, target),
            time_base: target,
        }
    }

    pub fn to_seconds(&self) -> f64 {
        self.value as f64 * self.time_base.to_f64()
    }

    pub fn to_micros(&self) -> i64 {
        self.time_base.rescale(self.value, Rational::MICROS)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exact comparison across time bases: `a * tb_a` vs `b * tb_b`.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * self.time_base.num as i128 * other.time_base.den as i128;
        let rhs = other.value as i128 * other.time_base.num as i128 * self.time_base.den as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.to_seconds();
        let hours = (secs / 3600.0).floor();
        let minutes = ((secs - hours * 3600.0) / 60.0).floor();
        let rest = secs - hours * 3600.0 - minutes * 60.0;
        write!(f, "{:02}:{:02}:{:06.3}", hours as i64, minutes as i64, rest)
    }
}
