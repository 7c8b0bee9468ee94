//! Shared data models for fixtures, markets, wagers and user accounts.
//!
//! Enumerations are persisted as snake_case strings; the `*Row` types mirror
//! table columns and convert into the validated domain types with `TryFrom`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::line::{Line, LineError};
use crate::odds::{AmericanOdd, OddsError};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: String },

    #[error("Invalid line: {0}")]
    InvalidLine(#[from] LineError),

    #[error("Invalid odd: {0}")]
    InvalidOdd(#[from] OddsError),

    #[error("A handicap market cannot back a draw")]
    DrawHandicap,

    #[error("Invalid score pair: {0}")]
    InvalidScore(String),
}

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ModelError::UnknownValue {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Side of a match outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
    Draw,
}

string_enum!(Side, "side", { Home => "home", Away => "away", Draw => "draw" });

/// Direction of a total market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Under,
    Over,
}

string_enum!(Direction, "direction", { Under => "under", Over => "over" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    FullTime,
    HalfTime,
}

string_enum!(Period, "period", { FullTime => "full_time", HalfTime => "half_time" });

/// The counted quantity a market is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetObject {
    Goals,
    Corners,
    Cards,
}

string_enum!(BetObject, "object", { Goals => "goals", Corners => "corners", Cards => "cards" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Moneyline,
    Handicap,
    Total,
}

string_enum!(MarketKind, "kind", { Moneyline => "moneyline", Handicap => "handicap", Total => "total" });

impl MarketKind {
    pub const ALL: [MarketKind; 3] = [MarketKind::Moneyline, MarketKind::Handicap, MarketKind::Total];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Unsettled,
    Settled,
}

string_enum!(MarketStatus, "market status", { Unsettled => "unsettled", Settled => "settled" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    Finished,
}

string_enum!(MatchStatus, "match status", { NotStarted => "not_started", Finished => "finished" });

/// What a market pays out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Moneyline { side: Side },
    Handicap { side: Side, line: Line },
    Total { direction: Direction, threshold: Line },
}

impl Selection {
    pub fn moneyline(side: Side) -> Self {
        Selection::Moneyline { side }
    }

    /// Handicap on a team. The line is applied to that team's score.
    pub fn handicap(side: Side, line: Decimal) -> Result<Self, ModelError> {
        if side == Side::Draw {
            return Err(ModelError::DrawHandicap);
        }
        Ok(Selection::Handicap {
            side,
            line: Line::new(line)?,
        })
    }

    pub fn total(direction: Direction, threshold: Decimal) -> Result<Self, ModelError> {
        Ok(Selection::Total {
            direction,
            threshold: Line::threshold(threshold)?,
        })
    }

    pub fn kind(&self) -> MarketKind {
        match self {
            Selection::Moneyline { .. } => MarketKind::Moneyline,
            Selection::Handicap { .. } => MarketKind::Handicap,
            Selection::Total { .. } => MarketKind::Total,
        }
    }

    /// Column encoding: (selection label, line). Moneyline stores a zero line.
    pub fn columns(&self) -> (&'static str, Decimal) {
        match self {
            Selection::Moneyline { side } => (side.as_str(), Decimal::ZERO),
            Selection::Handicap { side, line } => (side.as_str(), line.value()),
            Selection::Total {
                direction,
                threshold,
            } => (direction.as_str(), threshold.value()),
        }
    }

    pub fn from_columns(kind: MarketKind, selection: &str, line: Decimal) -> Result<Self, ModelError> {
        match kind {
            MarketKind::Moneyline => Ok(Selection::moneyline(selection.parse()?)),
            MarketKind::Handicap => Selection::handicap(selection.parse()?, line),
            MarketKind::Total => Selection::total(selection.parse()?, line),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Moneyline { side } => write!(f, "{}", side),
            Selection::Handicap { side, line } => write!(f, "{} {}", side, line),
            Selection::Total {
                direction,
                threshold,
            } => write!(f, "{} {}", direction, threshold.value()),
        }
    }
}

/// A "home-away" statistic pair, e.g. a score of `2-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    pub home: u32,
    pub away: u32,
}

impl ScorePair {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Parse an optional stored pair; blank strings mean "not recorded".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ModelError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }
}

impl FromStr for ScorePair {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (home, away) = s
            .split_once('-')
            .ok_or_else(|| ModelError::InvalidScore(s.to_string()))?;
        let home = home
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidScore(s.to_string()))?;
        let away = away
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidScore(s.to_string()))?;
        Ok(Self { home, away })
    }
}

impl fmt::Display for ScorePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// Final statistics reported once a match has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStats {
    pub halftime: Option<ScorePair>,
    pub fulltime: Option<ScorePair>,
    pub corners: Option<ScorePair>,
    pub cards: Option<ScorePair>,
}

/// A soccer match and whatever results are known for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: FinalStats,
}

impl Fixture {
    /// A fixture that has not been played yet.
    pub fn scheduled(
        id: i64,
        league: &str,
        home_team: &str,
        away_team: &str,
        kickoff: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            league: league.to_string(),
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            kickoff,
            status: MatchStatus::NotStarted,
            finished_at: None,
            stats: FinalStats::default(),
        }
    }

    /// Transition to Finished with the reported statistics. Has no effect on
    /// a fixture that is already finished.
    pub fn finish(&mut self, stats: FinalStats, at: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = MatchStatus::Finished;
        self.finished_at = Some(at);
        self.stats = stats;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }
}

/// Fixture row from the database.
#[derive(Debug, Clone, FromRow)]
pub struct FixtureRow {
    pub id: i64,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub halftime_score: Option<String>,
    pub fulltime_score: Option<String>,
    pub corners: Option<String>,
    pub cards: Option<String>,
}

impl TryFrom<FixtureRow> for Fixture {
    type Error = ModelError;

    fn try_from(row: FixtureRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            league: row.league,
            home_team: row.home_team,
            away_team: row.away_team,
            kickoff: row.kickoff,
            status: row.status.parse()?,
            finished_at: row.finished_at,
            stats: FinalStats {
                halftime: ScorePair::parse_optional(row.halftime_score.as_deref())?,
                fulltime: ScorePair::parse_optional(row.fulltime_score.as_deref())?,
                corners: ScorePair::parse_optional(row.corners.as_deref())?,
                cards: ScorePair::parse_optional(row.cards.as_deref())?,
            },
        })
    }
}

/// Fields that identify a market definition. Re-importing an offer with the
/// same identity is a no-op; a different odd makes a distinct market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarketIdentity {
    pub match_id: i64,
    pub period: Period,
    pub object: BetObject,
    pub selection: Selection,
    pub odd: AmericanOdd,
}

/// An offered market ("bet info"). Immutable apart from its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    pub match_id: i64,
    pub period: Period,
    pub object: BetObject,
    pub selection: Selection,
    pub odd: AmericanOdd,
    pub status: MarketStatus,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Market {
    pub fn kind(&self) -> MarketKind {
        self.selection.kind()
    }

    pub fn is_settled(&self) -> bool {
        self.status == MarketStatus::Settled
    }

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

/// Market row from the database.
#[derive(Debug, Clone, FromRow)]
pub struct MarketRow {
    pub id: Uuid,
    pub match_id: i64,
    pub kind: String,
    pub period: String,
    pub object: String,
    pub selection: String,
    pub line: Decimal,
    pub odd: i32,
    pub status: String,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<MarketRow> for Market {
    type Error = ModelError;

    fn try_from(row: MarketRow) -> Result<Self, Self::Error> {
        let kind: MarketKind = row.kind.parse()?;
        Ok(Self {
            id: row.id,
            match_id: row.match_id,
            period: row.period.parse()?,
            object: row.object.parse()?,
            selection: Selection::from_columns(kind, &row.selection, row.line)?,
            odd: AmericanOdd::new(row.odd)?,
            status: row.status.parse()?,
            settled_at: row.settled_at,
        })
    }
}

/// A user's stake on one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Wager {
    pub id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub stake: Decimal,
    /// Set once, by settlement.
    pub payout: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn market_row(kind: &str, selection: &str, line: Decimal) -> MarketRow {
        MarketRow {
            id: Uuid::new_v4(),
            match_id: 7,
            kind: kind.to_string(),
            period: "full_time".to_string(),
            object: "goals".to_string(),
            selection: selection.to_string(),
            line,
            odd: -110,
            status: "unsettled".to_string(),
            settled_at: None,
        }
    }

    #[test]
    fn test_enum_string_round_trip() {
        for kind in MarketKind::ALL {
            assert_eq!(kind.as_str().parse::<MarketKind>().unwrap(), kind);
        }
        assert_eq!("half_time".parse::<Period>().unwrap(), Period::HalfTime);
        assert_eq!(MatchStatus::NotStarted.to_string(), "not_started");
    }

    #[test]
    fn test_unknown_enum_value() {
        let err = "penalties".parse::<BetObject>().unwrap_err();
        assert!(matches!(err, ModelError::UnknownValue { field: "object", .. }));
    }

    #[test]
    fn test_score_pair_parse() {
        assert_eq!("2-1".parse::<ScorePair>().unwrap(), ScorePair::new(2, 1));
        assert_eq!("3 - 0".parse::<ScorePair>().unwrap(), ScorePair::new(3, 0));
        assert!("2:1".parse::<ScorePair>().is_err());
        assert!("a-1".parse::<ScorePair>().is_err());
        assert!("-1".parse::<ScorePair>().is_err());
    }

    #[test]
    fn test_score_pair_optional() {
        assert_eq!(ScorePair::parse_optional(None).unwrap(), None);
        assert_eq!(ScorePair::parse_optional(Some("")).unwrap(), None);
        assert_eq!(ScorePair::parse_optional(Some("  ")).unwrap(), None);
        assert_eq!(
            ScorePair::parse_optional(Some("5-4")).unwrap(),
            Some(ScorePair::new(5, 4))
        );
        assert_eq!(ScorePair::new(5, 4).to_string(), "5-4");
    }

    #[test]
    fn test_handicap_rejects_draw() {
        assert!(matches!(
            Selection::handicap(Side::Draw, dec!(0.5)),
            Err(ModelError::DrawHandicap)
        ));
    }

    #[test]
    fn test_market_row_conversion() {
        let market = Market::try_from(market_row("handicap", "home", dec!(-1.25))).unwrap();
        assert_eq!(market.kind(), MarketKind::Handicap);
        assert_eq!(
            market.selection,
            Selection::handicap(Side::Home, dec!(-1.25)).unwrap()
        );
        assert_eq!(market.odd.value(), -110);
        assert!(!market.is_settled());
    }

    #[test]
    fn test_market_row_rejects_bad_line() {
        let err = Market::try_from(market_row("total", "over", dec!(2.3))).unwrap_err();
        assert!(matches!(err, ModelError::InvalidLine(_)));
    }

    #[test]
    fn test_market_row_rejects_mismatched_selection() {
        let err = Market::try_from(market_row("total", "home", dec!(2.5))).unwrap_err();
        assert!(matches!(err, ModelError::UnknownValue { field: "direction", .. }));
    }

    #[test]
    fn test_selection_columns_round_trip() {
        let selection = Selection::total(Direction::Over, dec!(2.75)).unwrap();
        let (label, line) = selection.columns();
        assert_eq!(label, "over");
        assert_eq!(
            Selection::from_columns(MarketKind::Total, label, line).unwrap(),
            selection
        );
    }

    #[test]
    fn test_selection_serde_tagged() {
        let selection = Selection::moneyline(Side::Away);
        let json = serde_json::to_value(selection).unwrap();
        assert_eq!(json["kind"], "moneyline");
        assert_eq!(json["side"], "away");
    }

    #[test]
    fn test_fixture_finishes_once() {
        let kickoff = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let mut fixture = Fixture::scheduled(1, "Premier League", "Arsenal", "Chelsea", kickoff);
        let stats = FinalStats {
            fulltime: Some(ScorePair::new(2, 1)),
            ..Default::default()
        };

        assert!(fixture.finish(stats.clone(), kickoff));
        assert!(fixture.is_finished());
        assert!(!fixture.finish(FinalStats::default(), kickoff));
        assert_eq!(fixture.stats, stats);
    }

    #[test]
    fn test_fixture_row_conversion() {
        let row = FixtureRow {
            id: 3,
            league: "La Liga".to_string(),
            home_team: "Sevilla".to_string(),
            away_team: "Betis".to_string(),
            kickoff: Utc::now(),
            status: "finished".to_string(),
            finished_at: Some(Utc::now()),
            halftime_score: Some("0-0".to_string()),
            fulltime_score: Some("1-1".to_string()),
            corners: Some(String::new()),
            cards: None,
        };
        let fixture = Fixture::try_from(row).unwrap();
        assert!(fixture.is_finished());
        assert_eq!(fixture.stats.fulltime, Some(ScorePair::new(1, 1)));
        assert_eq!(fixture.stats.corners, None);
    }
}
