//! Rational numbers for time bases, frame rates and aspect ratios.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A rational number `num / den` with a positive denominator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator
    pub num: i64,
    /// Denominator (always positive)
    pub den: i64,
}

impl Rational {
    /// Create a new rational, moving the sign to the numerator.
    ///
    /// # Panics
    ///
    /// Panics if the denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        Self { num, den }
    }

    /// Fallible constructor used when parsing user input.
    pub fn try_new(num: i64, den: i64) -> Result<Self, Error> {
        if den == 0 {
            return Err(Error::invalid_argument(format!(
                "rational {}/{} has a zero denominator",
                num, den
            )));
        }
        Ok(Self::new(num, den).reduce())
    }

    /// Zero (`0/1`).
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Microsecond time base (`1/1000000`).
    pub const MICROS: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Reduce to lowest terms.
    pub fn reduce(&self) -> Self {
        if self.num == 0 {
            return Self { num: 0, den: 1 };
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()) as i64;
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Swap numerator and denominator. Returns `None` for zero.
    pub fn invert(&self) -> Option<Self> {
        if self.num == 0 {
            None
        } else {
            Some(Self::new(self.den, self.num))
        }
    }

    /// Rescale `value` expressed in `self` units into `target` units,
    /// rounding to the nearest integer (halfway cases away from zero).
    pub fn rescale(&self, value: i64, target: Rational) -> i64 {
        if *self == target {
            return value;
        }
        let num = value as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        div_round(num, den) as i64
    }

    /// Rescale rounding towards negative infinity.
    pub fn rescale_floor(&self, value: i64, target: Rational) -> i64 {
        let num = value as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        num.div_euclid(den) as i64
    }

    /// Number of `self` ticks in one period of `rate` (e.g. ticks per frame).
    ///
    /// Returns at least 1.
    pub fn ticks_per(&self, rate: Rational) -> i64 {
        if rate.num == 0 {
            return 1;
        }
        let num = self.den as i128 * rate.den as i128;
        let den = self.num as i128 * rate.num as i128;
        div_round(num, den).max(1) as i64
    }
}

fn div_round(num: i128, den: i128) -> i128 {
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    if num >= 0 {
        (num + den / 2) / den
    } else {
        -((-num + den / 2) / den)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl From<(i64, i64)> for Rational {
    fn from((num, den): (i64, i64)) -> Self {
        Self::new(num, den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num as i64, den as i64)
    }
}

/// Parses `"num/den"`, `"num:den"` or a bare integer.
impl FromStr for Rational {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid_argument(format!("invalid rational '{}'", s)))
        };
        match s.split_once(['/', ':']) {
            Some((n, d)) => Self::try_new(parse(n)?, parse(d)?),
            None => Ok(Self::new(parse(s)?, 1)),
        }
    }
}

impl Serialize for Rational {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rational {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}
