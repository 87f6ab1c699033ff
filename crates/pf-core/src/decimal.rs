//! Precision-safe price type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Futures prices sit on a
//! tick grid and P&L is computed as points × point value, so float drift
//! would show up directly in realized balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

/// Instrument price in index points.
///
/// Wraps `Decimal` so prices cannot be mixed up with currency amounts,
/// which stay plain `Decimal` throughout the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Absolute distance to another price, in points.
    #[inline]
    pub fn distance(&self, other: Price) -> Decimal {
        (self.0 - other.0).abs()
    }

    /// Round to the nearest tick.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Decimal) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size).round() * tick_size)
    }

    /// Offset by a signed number of points.
    #[inline]
    pub fn offset(&self, points: Decimal) -> Self {
        Self(self.0 + points)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add<Decimal> for Price {
    type Output = Self;

    fn add(self, rhs: Decimal) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Decimal> for Price {
    type Output = Self;

    fn sub(self, rhs: Decimal) -> Self::Output {
        Self(self.0 - rhs)
    }
}

/// Difference between two prices, in points (signed).
impl Sub for Price {
    type Output = Decimal;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}
