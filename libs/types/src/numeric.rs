//! Decimal types for prices and sizes
//!
//! Prices and sizes stay in `rust_decimal` so OHLCV aggregation and book
//! walks are exact. Indicator math (square roots, logarithms) runs on `f64`
//! and converts at the boundary through [`to_f64`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Trade or level price.
pub type Price = Decimal;

/// Traded or resting size.
pub type Size = Decimal;

/// Unix nanoseconds.
pub type Nanos = i64;

/// Convert a decimal to `f64` for floating-point indicator math.
///
/// Every finite `Decimal` fits in an `f64` (with rounding), so the NaN
/// fallback is unreachable for values produced by the engine.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(Decimal::new(10050, 2)), 100.5);
        assert_eq!(to_f64(Decimal::ZERO), 0.0);
    }
}
