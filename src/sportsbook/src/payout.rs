//! Payout calculation for a single wager.
//!
//! A winning leg returns `stake * (1 + multiplier)` rounded to cents, a push
//! returns the stake and a loss returns nothing. Quarter lines settle as two
//! legs on the adjacent lines, each carrying half of the stake.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::line::{Line, LineSplit};
use crate::models::{Direction, Selection, Side};
use crate::odds::AmericanOdd;
use crate::resolver::{Resolution, ResolveError};

/// Result of grading one leg of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Win,
    Push,
    Loss,
}

impl Grade {
    pub fn payout(self, odd: AmericanOdd, stake: Decimal) -> Decimal {
        match self {
            Grade::Win => odd.win_payout(stake),
            Grade::Push => stake,
            Grade::Loss => Decimal::ZERO,
        }
    }
}

/// Moneyline: the backed side must be the outright winner. Draw is its own
/// market, so a draw is simply a loss for Home and Away backers.
pub fn grade_moneyline(resolution: &Resolution, side: Side) -> Grade {
    if resolution.winning_side() == side {
        Grade::Win
    } else {
        Grade::Loss
    }
}

/// Handicap leg on a whole or half line. A tie after the line is a push.
pub fn grade_handicap(resolution: &Resolution, side: Side, line: Line) -> Grade {
    match resolution.winning_side_with(side, line) {
        Side::Draw => Grade::Push,
        winner if winner == side => Grade::Win,
        _ => Grade::Loss,
    }
}

/// Total leg on a whole or half threshold. Landing on the threshold is a push.
pub fn grade_total(resolution: &Resolution, direction: Direction, threshold: Line) -> Grade {
    let total = resolution.total();
    let threshold = threshold.value();
    if total == threshold {
        Grade::Push
    } else if (total < threshold) == (direction == Direction::Under) {
        Grade::Win
    } else {
        Grade::Loss
    }
}

/// Split a stake into two halves that add back up to the stake exactly.
fn halve(stake: Decimal) -> (Decimal, Decimal) {
    let first = (stake / Decimal::TWO).round_dp(2);
    (first, stake - first)
}

fn settle_line(line: Line, stake: Decimal, leg: impl Fn(Line, Decimal) -> Decimal) -> Decimal {
    match line.split() {
        LineSplit::Single(line) => leg(line, stake),
        LineSplit::Quarter(lower, upper) => {
            let (first, second) = halve(stake);
            leg(lower, first) + leg(upper, second)
        }
    }
}

/// Compute the total returned to the bettor.
///
/// An unavailable result refunds the full stake on every path, so a
/// settlement batch always completes.
pub fn compute_payout(
    selection: &Selection,
    odd: AmericanOdd,
    stake: Decimal,
    resolved: Result<&Resolution, ResolveError>,
) -> Decimal {
    let resolution = match resolved {
        Ok(resolution) => resolution,
        Err(ResolveError::ResultUnavailable { .. }) => return stake,
    };

    match *selection {
        Selection::Moneyline { side } => grade_moneyline(resolution, side).payout(odd, stake),
        Selection::Handicap { side, line } => settle_line(line, stake, |line, stake| {
            grade_handicap(resolution, side, line).payout(odd, stake)
        }),
        Selection::Total {
            direction,
            threshold,
        } => settle_line(threshold, stake, |threshold, stake| {
            grade_total(resolution, direction, threshold).payout(odd, stake)
        }),
    }
}
