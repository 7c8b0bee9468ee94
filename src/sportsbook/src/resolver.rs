//! Match result resolution.
//!
//! Picks the statistic pair a market is graded on and derives the winning
//! side (optionally after a handicap) and the combined total.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::line::Line;
use crate::models::{BetObject, Fixture, Market, Period, ScorePair, Selection, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The match has not finished, or the statistic was never reported.
    /// Settlement treats this as a refund.
    #[error("Result for match {match_id} is not available")]
    ResultUnavailable { match_id: i64 },
}

/// The raw statistic pair a market is graded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub home: Decimal,
    pub away: Decimal,
}

/// Winning side and total for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winning_side: Side,
    pub total: Decimal,
}

impl Resolution {
    pub fn from_pair(pair: ScorePair) -> Self {
        Self {
            home: Decimal::from(pair.home),
            away: Decimal::from(pair.away),
        }
    }

    pub fn total(&self) -> Decimal {
        self.home + self.away
    }

    pub fn winning_side(&self) -> Side {
        compare(self.home, self.away)
    }

    /// Winning side once `line` is added to the score of `backed`.
    pub fn winning_side_with(&self, backed: Side, line: Line) -> Side {
        match backed {
            Side::Home => compare(self.home + line.value(), self.away),
            _ => compare(self.home, self.away + line.value()),
        }
    }

    /// Outcome for a selection, with its own handicap line applied.
    pub fn outcome(&self, selection: &Selection) -> Outcome {
        let winning_side = match *selection {
            Selection::Handicap { side, line } => self.winning_side_with(side, line),
            _ => self.winning_side(),
        };
        Outcome {
            winning_side,
            total: self.total(),
        }
    }
}

fn compare(home: Decimal, away: Decimal) -> Side {
    if home > away {
        Side::Home
    } else if away > home {
        Side::Away
    } else {
        Side::Draw
    }
}

/// Statistic pair for an object and period. Corners and cards are only
/// reported for the full match, so the period is ignored for them.
pub fn select_pair(fixture: &Fixture, object: BetObject, period: Period) -> Option<ScorePair> {
    match (object, period) {
        (BetObject::Goals, Period::FullTime) => fixture.stats.fulltime,
        (BetObject::Goals, Period::HalfTime) => fixture.stats.halftime,
        (BetObject::Corners, _) => fixture.stats.corners,
        (BetObject::Cards, _) => fixture.stats.cards,
    }
}

/// Resolve the statistic pair a market is graded on.
pub fn resolve(market: &Market, fixture: &Fixture) -> Result<Resolution, ResolveError> {
    debug_assert_eq!(market.match_id, fixture.id);

    let unavailable = ResolveError::ResultUnavailable {
        match_id: fixture.id,
    };
    if !fixture.is_finished() {
        return Err(unavailable);
    }

    select_pair(fixture, market.object, market.period)
        .map(Resolution::from_pair)
        .ok_or(unavailable)
}

/// Resolve a market to its winning side and total.
pub fn resolve_outcome(market: &Market, fixture: &Fixture) -> Result<Outcome, ResolveError> {
    resolve(market, fixture).map(|resolution| resolution.outcome(&market.selection))
}
