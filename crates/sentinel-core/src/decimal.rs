//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, avoiding
//! floating-point rounding errors in price gates and exchange quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with sizes in calculations.
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
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to tick size.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }

    /// Absolute percentage change of `self` relative to `baseline`.
    ///
    /// Returns None for a zero baseline.
    #[inline]
    pub fn abs_pct_change_from(&self, baseline: Price) -> Option<Decimal> {
        if baseline.is_zero() {
            return None;
        }
        Some(((self.0 - baseline.0) / baseline.0 * Decimal::ONE_HUNDRED).abs())
    }

    /// Shift the price by `pct` percent (negative moves it down).
    #[inline]
    pub fn offset_pct(&self, pct: Decimal) -> Self {
        Self(self.0 * (Decimal::ONE + pct / Decimal::ONE_HUNDRED))
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

/// Size/quantity with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
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
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to a multiple of `step`.
    #[inline]
    pub fn round_down_to_step(&self, step: Size) -> Self {
        if step.is_zero() {
            return *self;
        }
        Self((self.0 / step.0).floor() * step.0)
    }

    /// Fix the number of decimal places, so `Display` prints exactly `decimals` digits.
    #[inline]
    pub fn with_scale(&self, decimals: u32) -> Self {
        let mut value = self.0.round_dp_with_strategy(
            decimals,
            rust_decimal::RoundingStrategy::ToZero,
        );
        value.rescale(decimals);
        Self(value)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_abs_pct_change() {
        let baseline = Price::new(dec!(100));
        assert_eq!(
            Price::new(dec!(101)).abs_pct_change_from(baseline),
            Some(dec!(1))
        );
        assert_eq!(
            Price::new(dec!(98)).abs_pct_change_from(baseline),
            Some(dec!(2))
        );
        assert_eq!(Price::new(dec!(98)).abs_pct_change_from(Price::ZERO), None);
    }

    #[test]
    fn test_price_round_to_tick() {
        let price = Price::new(dec!(12345.6789));
        let tick = Price::new(dec!(0.01));

        let rounded = price.round_to_tick(tick);
        assert_eq!(rounded.0, dec!(12345.67));
    }

    #[test]
    fn test_offset_pct() {
        let p = Price::new(dec!(200));
        assert_eq!(p.offset_pct(dec!(-2)).inner(), dec!(196));
        assert_eq!(p.offset_pct(dec!(5)).inner(), dec!(210));
    }

    #[test]
    fn test_size_round_down_to_step() {
        let size = Size::new(dec!(1.2345));
        let step = Size::new(dec!(0.001));

        let rounded = size.round_down_to_step(step);
        assert_eq!(rounded.0, dec!(1.234));
    }

    #[test]
    fn test_size_with_scale_pads_digits() {
        assert_eq!(Size::new(dec!(10)).with_scale(3).to_string(), "10.000");
        assert_eq!(Size::new(dec!(0.1239)).with_scale(3).to_string(), "0.123");
    }
}
