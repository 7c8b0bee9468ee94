//! Handicap lines and total thresholds.
//!
//! Only whole, half and quarter values are quotable. Quarter ("Asian") lines
//! are settled as two half-stake legs on the neighbouring lines, see
//! [`Line::split`].

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const QUARTER: Decimal = dec!(0.25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("Line {0} must end in .0, .25, .5 or .75")]
    InvalidFraction(Decimal),

    #[error("Total threshold {0} must not be negative")]
    NegativeThreshold(Decimal),
}

/// A validated handicap line or total threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Line(Decimal);

/// Settlement legs of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSplit {
    /// Whole or half line, settled as a single leg.
    Single(Line),
    /// Quarter line, settled as two half-stake legs (lower, upper).
    Quarter(Line, Line),
}

impl Line {
    /// Validate a signed line.
    pub fn new(value: Decimal) -> Result<Self, LineError> {
        let fraction = value.fract().abs();
        if [dec!(0), QUARTER, dec!(0.5), dec!(0.75)].contains(&fraction) {
            Ok(Self(value.normalize()))
        } else {
            Err(LineError::InvalidFraction(value))
        }
    }

    /// Validate a total threshold (non-negative line).
    pub fn threshold(value: Decimal) -> Result<Self, LineError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LineError::NegativeThreshold(value));
        }
        Self::new(value)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// True for lines ending in .25 or .75.
    pub fn is_quarter(self) -> bool {
        let fraction = self.0.fract().abs();
        fraction == QUARTER || fraction == dec!(0.75)
    }

    /// Decompose into settlement legs.
    ///
    /// A quarter line `q` becomes `q - 0.25` and `q + 0.25`, neither of which
    /// is itself a quarter line, so settlement never nests deeper than one split.
    pub fn split(self) -> LineSplit {
        if !self.is_quarter() {
            return LineSplit::Single(self);
        }

        let lower = Line((self.0 - QUARTER).normalize());
        let upper = Line((self.0 + QUARTER).normalize());
        debug_assert!(!lower.is_quarter() && !upper.is_quarter());

        LineSplit::Quarter(lower, upper)
    }
}

impl TryFrom<Decimal> for Line {
    type Error = LineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Line::new(value)
    }
}

impl From<Line> for Decimal {
    fn from(line: Line) -> Self {
        line.0
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_sign_positive() && !self.0.is_zero() {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
