//! Decimal (European) and American odds conversion.
//!
//! Bookmaker feeds quote decimal odds; markets are stored with American odds
//! and payouts are computed from the American quote.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OddsError {
    #[error("Decimal odd {0} has no American equivalent")]
    NonRepresentable(Decimal),

    #[error("American odd must be non-zero")]
    Zero,
}

/// A non-zero American odd. Positive quotes pay `odd / 100` per unit staked,
/// negative quotes pay `100 / |odd|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct AmericanOdd(i32);

impl AmericanOdd {
    pub fn new(value: i32) -> Result<Self, OddsError> {
        if value == 0 {
            return Err(OddsError::Zero);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Profit per unit staked.
    pub fn multiplier(self) -> Decimal {
        let odd = Decimal::from(self.0);
        if self.0 > 0 {
            odd / dec!(100)
        } else {
            dec!(100) / odd.abs()
        }
    }

    /// Total returned on a winning stake (stake plus profit), rounded to cents.
    pub fn win_payout(self, stake: Decimal) -> Decimal {
        (stake + stake * self.multiplier()).round_dp(2)
    }
}

impl TryFrom<i32> for AmericanOdd {
    type Error = OddsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        AmericanOdd::new(value)
    }
}

impl From<AmericanOdd> for i32 {
    fn from(odd: AmericanOdd) -> Self {
        odd.0
    }
}

impl fmt::Display for AmericanOdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Convert a decimal odd to an American odd.
///
/// Odds at or above 2.00 map to `(d - 1) * 100`, shorter odds to
/// `-100 / (d - 1)`, both rounded to the nearest integer (ties to even).
/// A decimal odd of 1.00 or below pays nothing and cannot be quoted.
pub fn to_american(decimal_odd: Decimal) -> Result<AmericanOdd, OddsError> {
    if decimal_odd <= Decimal::ONE {
        return Err(OddsError::NonRepresentable(decimal_odd));
    }

    let profit = decimal_odd - Decimal::ONE;
    let american = if decimal_odd >= dec!(2) {
        (profit * dec!(100)).round()
    } else {
        (dec!(-100) / profit).round()
    };

    american
        .to_i32()
        .ok_or(OddsError::NonRepresentable(decimal_odd))
        .and_then(AmericanOdd::new)
}

/// Profit multiplier for a raw American odd.
pub fn to_payout_multiplier(american_odd: i32) -> Result<Decimal, OddsError> {
    Ok(AmericanOdd::new(american_odd)?.multiplier())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underdog_conversion() {
        assert_eq!(to_american(dec!(2.50)).unwrap().value(), 150);
        assert_eq!(to_american(dec!(2.00)).unwrap().value(), 100);
        assert_eq!(to_american(dec!(11.0)).unwrap().value(), 1000);
    }

    #[test]
    fn test_favorite_conversion() {
        assert_eq!(to_american(dec!(1.50)).unwrap().value(), -200);
        assert_eq!(to_american(dec!(1.25)).unwrap().value(), -400);
        // -100 / 0.91 = -109.89...
        assert_eq!(to_american(dec!(1.91)).unwrap().value(), -110);
    }

    #[test]
    fn test_conversion_rounds_half_to_even() {
        // (2.225 - 1) * 100 = 122.5
        assert_eq!(to_american(dec!(2.225)).unwrap().value(), 122);
        // (2.235 - 1) * 100 = 123.5
        assert_eq!(to_american(dec!(2.235)).unwrap().value(), 124);
    }

    #[test]
    fn test_even_money_is_not_representable() {
        assert_eq!(
            to_american(dec!(1.00)),
            Err(OddsError::NonRepresentable(dec!(1.00)))
        );
        assert!(to_american(dec!(0.8)).is_err());
    }

    #[test]
    fn test_multiplier() {
        assert_eq!(to_payout_multiplier(150).unwrap(), dec!(1.5));
        assert_eq!(to_payout_multiplier(-200).unwrap(), dec!(0.5));
        assert_eq!(to_payout_multiplier(100).unwrap(), dec!(1));
        assert_eq!(to_payout_multiplier(0), Err(OddsError::Zero));
    }

    #[test]
    fn test_round_trip_approximates_profit() {
        for decimal_odd in [dec!(1.05), dec!(1.33), dec!(1.91), dec!(2.0), dec!(2.62), dec!(7.5)] {
            let american = to_american(decimal_odd).unwrap();
            let multiplier = american.multiplier();
            let expected = decimal_odd - Decimal::ONE;
            let tolerance = dec!(0.01) * (Decimal::ONE + expected);
            assert!(
                (multiplier - expected).abs() <= tolerance,
                "{} -> {} -> {} (expected ~{})",
                decimal_odd,
                american,
                multiplier,
                expected
            );
        }
    }

    #[test]
    fn test_win_payout() {
        assert_eq!(AmericanOdd::new(150).unwrap().win_payout(dec!(100)), dec!(250.00));
        assert_eq!(AmericanOdd::new(-110).unwrap().win_payout(dec!(50)), dec!(95.45));
        assert_eq!(AmericanOdd::new(-200).unwrap().win_payout(dec!(30)), dec!(45.00));
    }

    #[test]
    fn test_win_payout_rounds_half_to_even() {
        // 0.05 + 0.05 * 0.25 = 0.0625 -> 0.06
        assert_eq!(AmericanOdd::new(-400).unwrap().win_payout(dec!(0.05)), dec!(0.06));
        // 0.01 * 1.5 = 0.015 -> 0.02; 0.03 * 1.5 = 0.045 -> 0.04
        assert_eq!(AmericanOdd::new(50).unwrap().win_payout(dec!(0.01)), dec!(0.02));
        assert_eq!(AmericanOdd::new(50).unwrap().win_payout(dec!(0.03)), dec!(0.04));
    }

    #[test]
    fn test_display() {
        assert_eq!(AmericanOdd::new(150).unwrap().to_string(), "+150");
        assert_eq!(AmericanOdd::new(-110).unwrap().to_string(), "-110");
    }
}
