//! Exchange-precision quantity normalization.
//!
//! Quantities are floored to the lot step, checked against the minimum, and
//! rescaled to exactly the exchange's decimal places. Protection legs are
//! sized from the confirmed executed quantity, never the requested one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core::{Price, Size};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("invalid step size {0}")]
    InvalidStep(Size),

    #[error("quantity {qty} below minimum {min}")]
    BelowMinimum { qty: Size, min: Size },
}

/// Exchange precision rules for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub step_size: Size,
    pub min_qty: Size,
    pub qty_decimals: u32,
    pub tick_size: Price,
}

impl InstrumentSpec {
    pub fn normalize_qty(&self, raw_qty: Size) -> Result<Size, NormalizationError> {
        normalize(raw_qty, self.step_size, self.min_qty, self.qty_decimals)
    }

    pub fn round_price(&self, price: Price) -> Price {
        price.round_to_tick(self.tick_size)
    }
}

/// Floor `raw_qty` to `step_size` and format to `decimals` places.
///
/// Fails if the step is not positive or the result is below `min_qty` (a zero
/// result always fails).
pub fn normalize(
    raw_qty: Size,
    step_size: Size,
    min_qty: Size,
    decimals: u32,
) -> Result<Size, NormalizationError> {
    if !step_size.is_positive() {
        return Err(NormalizationError::InvalidStep(step_size));
    }

    let floored = raw_qty.round_down_to_step(step_size).with_scale(decimals);
    if floored < min_qty || !floored.is_positive() {
        return Err(NormalizationError::BelowMinimum {
            qty: floored,
            min: min_qty,
        });
    }
    Ok(floored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn size(d: rust_decimal::Decimal) -> Size {
        Size::new(d)
    }

    #[test]
    fn test_rounds_down_to_step() {
        let qty = normalize(size(dec!(0.12345678)), size(dec!(0.001)), size(dec!(0.01)), 3).unwrap();
        assert_eq!(qty, size(dec!(0.123)));
        assert_eq!(qty.to_string(), "0.123");
    }

    #[test]
    fn test_below_minimum_errors() {
        let err = normalize(size(dec!(0.005)), size(dec!(0.001)), size(dec!(0.01)), 3).unwrap_err();
        assert!(matches!(err, NormalizationError::BelowMinimum { .. }));
    }

    #[test]
    fn test_pads_to_decimals() {
        let qty = normalize(size(dec!(10)), size(dec!(0.001)), size(dec!(0.01)), 3).unwrap();
        assert_eq!(qty.to_string(), "10.000");
    }

    #[test]
    fn test_invalid_step() {
        assert_eq!(
            normalize(size(dec!(1)), Size::ZERO, Size::ZERO, 3),
            Err(NormalizationError::InvalidStep(Size::ZERO))
        );
    }

    #[test]
    fn test_zero_result_fails_even_with_zero_minimum() {
        assert!(normalize(size(dec!(0.0004)), size(dec!(0.001)), Size::ZERO, 3).is_err());
    }

    #[test]
    fn test_coarse_step() {
        let qty = normalize(size(dec!(7.9)), size(dec!(0.5)), size(dec!(1)), 1).unwrap();
        assert_eq!(qty.to_string(), "7.5");
    }
}
