//! Fixed-point monetary helpers.
//!
//! Every persisted amount in the system is a `Decimal` quantized to 2
//! places. Engine math that runs through `f64` (crash curves, multiplier
//! tables) converts back through [`from_f64`] before touching a wallet.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::errors::{CoreError, CoreResult};

/// Round to 2 decimal places, banker-free (half away from zero).
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an engine-side `f64` into a ledger amount.
pub fn from_f64(value: f64) -> CoreResult<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| CoreError::Internal(format!("non-finite amount: {}", value)))
}

/// Multiply a stake by an `f64` multiplier and quantize the result.
pub fn mul_f64(stake: Decimal, multiplier: f64) -> CoreResult<Decimal> {
    Ok(round2(stake * from_f64(multiplier)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round2() {
        assert_eq!(round2(dec!(11.0227)), dec!(11.02));
        assert_eq!(round2(dec!(11.025)), dec!(11.03));
        assert_eq!(round2(dec!(20)), dec!(20));
    }

    #[test]
    fn test_mul_f64() {
        assert_eq!(mul_f64(dec!(10), 2.0).unwrap(), dec!(20.00));
        assert_eq!(mul_f64(dec!(100), 0.5).unwrap(), dec!(50.00));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(from_f64(f64::NAN).is_err());
        assert!(from_f64(f64::INFINITY).is_err());
    }
}
