//! Turning bookmaker offers into market definitions.
//!
//! Offers arrive as a label ("Home", "Away -1.25", "Over 2.5") and a decimal
//! odd. Each is converted to a [`NewMarket`] with an American odd; offers that
//! cannot be represented are counted and dropped, as are offers that repeat
//! an existing market.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    BetObject, Direction, MarketIdentity, MarketKind, ModelError, Period, Selection, Side,
};
use crate::odds::{to_american, AmericanOdd, OddsError};

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("Unrecognised {kind} label: {label:?}")]
    UnknownLabel { kind: MarketKind, label: String },

    #[error("Invalid market: {0}")]
    InvalidMarket(#[from] ModelError),

    #[error("Unusable odd: {0}")]
    Odd(#[from] OddsError),
}

/// A single quote as published by the bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferedMarket {
    pub kind: MarketKind,
    pub period: Period,
    pub object: BetObject,
    pub label: String,
    pub decimal_odd: Decimal,
}

/// A market definition ready to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMarket {
    pub match_id: i64,
    pub period: Period,
    pub object: BetObject,
    pub selection: Selection,
    pub odd: AmericanOdd,
}

impl NewMarket {
    pub fn identity(&self) -> MarketIdentity {
        MarketIdentity {
            match_id: self.match_id,
            period: self.period,
            object: self.object,
            selection: self.selection,
            odd: self.odd,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    pub markets: Vec<NewMarket>,
    /// Offers that match an existing market or repeat one earlier in the batch.
    pub duplicates: usize,
    /// Offers whose decimal odd has no American equivalent.
    pub non_representable: usize,
    /// Offers with a label or line that cannot be read.
    pub invalid: usize,
    /// Draw handicaps, which are not offered.
    pub skipped: usize,
}

fn parse_side(token: &str) -> Option<Side> {
    match token.to_ascii_lowercase().as_str() {
        "home" => Some(Side::Home),
        "away" => Some(Side::Away),
        "draw" => Some(Side::Draw),
        _ => None,
    }
}

fn parse_direction(token: &str) -> Option<Direction> {
    match token.to_ascii_lowercase().as_str() {
        "over" => Some(Direction::Over),
        "under" => Some(Direction::Under),
        _ => None,
    }
}

fn parse_number(token: &str) -> Option<Decimal> {
    token.trim_start_matches('+').parse().ok()
}

/// Read one offer. Returns `Ok(None)` for offers that are deliberately not
/// listed (a handicap on the draw).
pub fn parse_offer(
    match_id: i64,
    offer: &OfferedMarket,
) -> Result<Option<NewMarket>, OfferError> {
    let unknown = || OfferError::UnknownLabel {
        kind: offer.kind,
        label: offer.label.clone(),
    };
    let mut tokens = offer.label.split_whitespace();
    let first = tokens.next().ok_or_else(unknown)?;
    let second = tokens.next();
    if tokens.next().is_some() {
        return Err(unknown());
    }

    let selection = match (offer.kind, second) {
        (MarketKind::Moneyline, None) => Selection::moneyline(parse_side(first).ok_or_else(unknown)?),
        (MarketKind::Handicap, Some(line)) => {
            let side = parse_side(first).ok_or_else(unknown)?;
            if side == Side::Draw {
                return Ok(None);
            }
            Selection::handicap(side, parse_number(line).ok_or_else(unknown)?)?
        }
        (MarketKind::Total, Some(threshold)) => Selection::total(
            parse_direction(first).ok_or_else(unknown)?,
            parse_number(threshold).ok_or_else(unknown)?,
        )?,
        _ => return Err(unknown()),
    };

    Ok(Some(NewMarket {
        match_id,
        period: offer.period,
        object: offer.object,
        selection,
        odd: to_american(offer.decimal_odd)?,
    }))
}

/// Build the list of markets to insert for a match.
pub fn plan_import(
    match_id: i64,
    offers: &[OfferedMarket],
    existing: &HashSet<MarketIdentity>,
) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut seen = existing.clone();

    for offer in offers {
        match parse_offer(match_id, offer) {
            Ok(Some(market)) => {
                if seen.insert(market.identity()) {
                    plan.markets.push(market);
                } else {
                    plan.duplicates += 1;
                }
            }
            Ok(None) => plan.skipped += 1,
            Err(OfferError::Odd(e)) => {
                debug!("[IMPORT] Match {} offer {:?} dropped: {}", match_id, offer.label, e);
                plan.non_representable += 1;
            }
            Err(e) => {
                debug!("[IMPORT] Match {} offer dropped: {}", match_id, e);
                plan.invalid += 1;
            }
        }
    }

    info!(
        "[IMPORT] Match {}: {} new markets ({} duplicates, {} non-representable, {} invalid, {} skipped)",
        match_id,
        plan.markets.len(),
        plan.duplicates,
        plan.non_representable,
        plan.invalid,
        plan.skipped
    );

    plan
}
