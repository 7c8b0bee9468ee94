//! Batch settlement of wagers once a match has finished.
//!
//! [`settle`] is pure: it resolves each market once, computes every wager's
//! payout and sums credits per user. [`SettlementEngine`] loads the batch from
//! a [`SettlementStore`] and commits it as a single unit.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Fixture, Market, MarketKind, Wager};
use crate::payout::compute_payout;
use crate::resolver::{resolve, Resolution, ResolveError};
use crate::store::{SettlementStore, StoreError};

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Wager {wager_id} references market {market_id}, which is not in the batch")]
    UnknownMarket { wager_id: Uuid, market_id: Uuid },

    #[error("Market {market_id} is a {found} market, batch settles {expected}")]
    KindMismatch {
        market_id: Uuid,
        expected: MarketKind,
        found: MarketKind,
    },

    #[error("Market {market_id} belongs to match {found}, batch settles match {expected}")]
    FixtureMismatch {
        market_id: Uuid,
        expected: i64,
        found: i64,
    },

    #[error("Settlement failed, retry: {0}")]
    Store(#[from] StoreError),
}

/// Everything needed to settle one kind of market for one match.
#[derive(Debug, Clone)]
pub struct SettlementInput {
    pub fixture: Fixture,
    pub markets: Vec<Market>,
    pub wagers: Vec<Wager>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WagerPayout {
    pub wager_id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub stake: Decimal,
    pub payout: Decimal,
}

/// Computed result of a settlement run, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementBatch {
    pub match_id: i64,
    pub kind: MarketKind,
    pub payouts: Vec<WagerPayout>,
    /// Total credited per user, ordered by user id (also the lock order).
    pub credits: BTreeMap<Uuid, Decimal>,
    pub market_ids: BTreeSet<Uuid>,
    pub settled_at: DateTime<Utc>,
}

/// Summary of a committed settlement run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReport {
    pub match_id: i64,
    pub kind: MarketKind,
    pub markets_settled: usize,
    pub settled_count: usize,
    pub affected_user_count: usize,
    pub total_staked: Decimal,
    pub total_paid: Decimal,
}

impl SettlementReport {
    pub fn empty(match_id: i64, kind: MarketKind) -> Self {
        Self {
            match_id,
            kind,
            markets_settled: 0,
            settled_count: 0,
            affected_user_count: 0,
            total_staked: Decimal::ZERO,
            total_paid: Decimal::ZERO,
        }
    }
}

impl SettlementBatch {
    pub fn settled_count(&self) -> usize {
        self.payouts.len()
    }

    pub fn affected_user_count(&self) -> usize {
        self.credits.len()
    }

    pub fn total_paid(&self) -> Decimal {
        self.payouts.iter().map(|p| p.payout).sum()
    }

    pub fn total_staked(&self) -> Decimal {
        self.payouts.iter().map(|p| p.stake).sum()
    }

    pub fn report(&self) -> SettlementReport {
        SettlementReport {
            match_id: self.match_id,
            kind: self.kind,
            markets_settled: self.market_ids.len(),
            settled_count: self.settled_count(),
            affected_user_count: self.affected_user_count(),
            total_staked: self.total_staked(),
            total_paid: self.total_paid(),
        }
    }
}

/// Compute payouts for every wager in the input.
///
/// Wagers may arrive in any order; a wager id listed twice is paid once.
/// Markets without wagers are still covered so they transition to settled.
pub fn settle(
    kind: MarketKind,
    input: &SettlementInput,
    settled_at: DateTime<Utc>,
) -> Result<SettlementBatch, SettlementError> {
    let fixture = &input.fixture;

    let mut resolved: HashMap<Uuid, (&Market, Result<Resolution, ResolveError>)> = HashMap::new();
    for market in &input.markets {
        if market.kind() != kind {
            return Err(SettlementError::KindMismatch {
                market_id: market.id,
                expected: kind,
                found: market.kind(),
            });
        }
        if market.match_id != fixture.id {
            return Err(SettlementError::FixtureMismatch {
                market_id: market.id,
                expected: fixture.id,
                found: market.match_id,
            });
        }
        resolved.insert(market.id, (market, resolve(market, fixture)));
    }

    let mut seen = HashSet::new();
    let mut payouts = Vec::with_capacity(input.wagers.len());
    let mut credits: BTreeMap<Uuid, Decimal> = BTreeMap::new();

    for wager in &input.wagers {
        if !seen.insert(wager.id) {
            continue;
        }

        let (market, resolution) = resolved.get(&wager.market_id).ok_or(
            SettlementError::UnknownMarket {
                wager_id: wager.id,
                market_id: wager.market_id,
            },
        )?;

        let payout = compute_payout(
            &market.selection,
            market.odd,
            wager.stake,
            resolution.as_ref().map_err(|e| *e),
        );

        *credits.entry(wager.user_id).or_default() += payout;
        payouts.push(WagerPayout {
            wager_id: wager.id,
            user_id: wager.user_id,
            market_id: wager.market_id,
            stake: wager.stake,
            payout,
        });
    }

    Ok(SettlementBatch {
        match_id: fixture.id,
        kind,
        payouts,
        credits,
        market_ids: resolved.keys().copied().collect(),
        settled_at,
    })
}

/// Settles matches against a store.
///
/// The engine does not check market status per wager; callers select matches
/// with unsettled markets, and the store refuses to settle a market twice.
pub struct SettlementEngine<S> {
    store: S,
}

impl<S: SettlementStore> SettlementEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Settle every unsettled market of one kind for a match.
    pub async fn settle_kind(
        &self,
        match_id: i64,
        kind: MarketKind,
    ) -> Result<SettlementReport, SettlementError> {
        let input = self.store.load_settlement_input(match_id, kind).await?;

        if input.markets.is_empty() {
            debug!("[SETTLE] Match {} has no unsettled {} markets", match_id, kind);
            return Ok(SettlementReport::empty(match_id, kind));
        }

        let batch = settle(kind, &input, Utc::now())?;
        self.store.commit_settlement(&batch).await?;

        let report = batch.report();
        info!(
            "[SETTLE] {} vs {}: {} {} bets settled across {} markets for {} users (staked ${}, paid ${})",
            input.fixture.home_team,
            input.fixture.away_team,
            report.settled_count,
            kind,
            report.markets_settled,
            report.affected_user_count,
            report.total_staked,
            report.total_paid
        );

        Ok(report)
    }

    /// Settle all market kinds for a match.
    pub async fn settle_match(&self, match_id: i64) -> Result<Vec<SettlementReport>, SettlementError> {
        let mut reports = Vec::with_capacity(MarketKind::ALL.len());
        for kind in MarketKind::ALL {
            reports.push(self.settle_kind(match_id, kind).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BetObject, Direction, FinalStats, MarketStatus, Period, ScorePair, Selection, Side,
    };
    use crate::odds::AmericanOdd;
    use crate::store::MockSettlementStore;
    use rust_decimal_macros::dec;

    fn fixture(fulltime: Option<ScorePair>) -> Fixture {
        let mut fixture = Fixture::scheduled(42, "Premier League", "Arsenal", "Chelsea", Utc::now());
        fixture.finish(
            FinalStats {
                fulltime,
                ..Default::default()
            },
            Utc::now(),
        );
        fixture
    }

    fn market(selection: Selection, odd: i32) -> Market {
        Market {
            id: Uuid::new_v4(),
            match_id: 42,
            period: Period::FullTime,
            object: BetObject::Goals,
            selection,
            odd: AmericanOdd::new(odd).unwrap(),
            status: MarketStatus::Unsettled,
            settled_at: None,
        }
    }

    fn wager(user_id: Uuid, market: &Market, stake: Decimal) -> Wager {
        Wager {
            id: Uuid::new_v4(),
            user_id,
            market_id: market.id,
            stake,
            payout: None,
            created_at: Utc::now(),
        }
    }

    fn moneyline_input() -> (SettlementInput, Uuid, Uuid) {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let home = market(Selection::moneyline(Side::Home), 150);
        let away = market(Selection::moneyline(Side::Away), 200);
        let draw = market(Selection::moneyline(Side::Draw), 230);
        let wagers = vec![
            wager(alice, &home, dec!(100)),
            wager(alice, &away, dec!(20)),
            wager(bob, &home, dec!(10)),
        ];
        let input = SettlementInput {
            fixture: fixture(Some(ScorePair::new(2, 1))),
            markets: vec![home, away, draw],
            wagers,
        };
        (input, alice, bob)
    }

    #[test]
    fn test_settle_aggregates_per_user() {
        let (input, alice, bob) = moneyline_input();
        let batch = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();

        assert_eq!(batch.settled_count(), 3);
        assert_eq!(batch.affected_user_count(), 2);
        assert_eq!(batch.credits[&alice], dec!(250.00));
        assert_eq!(batch.credits[&bob], dec!(25.00));
        assert_eq!(batch.total_paid(), dec!(275.00));
        assert_eq!(batch.total_staked(), dec!(130));
        // the draw market has no wagers but is still covered
        assert_eq!(batch.market_ids.len(), 3);
    }

    #[test]
    fn test_settle_losing_wager_records_zero() {
        let (input, alice, _) = moneyline_input();
        let batch = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();
        let losing = batch
            .payouts
            .iter()
            .find(|p| p.user_id == alice && p.stake == dec!(20))
            .unwrap();
        assert_eq!(losing.payout, dec!(0));
    }

    #[test]
    fn test_settle_is_order_independent() {
        let (mut input, _, _) = moneyline_input();
        let forward = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();
        input.wagers.reverse();
        let reversed = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();
        assert_eq!(forward.credits, reversed.credits);
    }

    #[test]
    fn test_settle_pays_duplicate_wager_once() {
        let (mut input, alice, _) = moneyline_input();
        let repeated = input.wagers[0].clone();
        input.wagers.push(repeated);

        let batch = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();
        assert_eq!(batch.settled_count(), 3);
        assert_eq!(batch.credits[&alice], dec!(250.00));
    }

    #[test]
    fn test_missing_result_refunds_every_wager() {
        let (mut input, alice, bob) = moneyline_input();
        input.fixture = fixture(None);

        let batch = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap();
        assert_eq!(batch.credits[&alice], dec!(120));
        assert_eq!(batch.credits[&bob], dec!(10));
        assert_eq!(batch.total_paid(), batch.total_staked());
    }

    #[test]
    fn test_settle_handicap_and_total_batches() {
        let user = Uuid::new_v4();
        let asian = market(Selection::handicap(Side::Home, dec!(-1.25)).unwrap(), -110);
        let input = SettlementInput {
            fixture: fixture(Some(ScorePair::new(2, 0))),
            wagers: vec![wager(user, &asian, dec!(100))],
            markets: vec![asian],
        };
        let batch = settle(MarketKind::Handicap, &input, Utc::now()).unwrap();
        assert_eq!(batch.credits[&user], dec!(190.90));

        let under = market(Selection::total(Direction::Under, dec!(2.5)).unwrap(), 110);
        let input = SettlementInput {
            fixture: fixture(Some(ScorePair::new(2, 1))),
            wagers: vec![wager(user, &under, dec!(100))],
            markets: vec![under],
        };
        let batch = settle(MarketKind::Total, &input, Utc::now()).unwrap();
        assert_eq!(batch.credits[&user], dec!(0.00));
        assert_eq!(batch.affected_user_count(), 1);
    }

    #[test]
    fn test_settle_rejects_wrong_kind() {
        let (input, _, _) = moneyline_input();
        let err = settle(MarketKind::Total, &input, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SettlementError::KindMismatch {
                expected: MarketKind::Total,
                found: MarketKind::Moneyline,
                ..
            }
        ));
    }

    #[test]
    fn test_settle_rejects_wager_on_unknown_market() {
        let (mut input, alice, _) = moneyline_input();
        let stray = market(Selection::moneyline(Side::Home), 100);
        input.wagers.push(wager(alice, &stray, dec!(5)));

        let err = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap_err();
        assert!(matches!(err, SettlementError::UnknownMarket { market_id, .. } if market_id == stray.id));
    }

    #[test]
    fn test_settle_rejects_market_from_other_match() {
        let (mut input, _, _) = moneyline_input();
        input.markets[0].match_id = 7;
        let err = settle(MarketKind::Moneyline, &input, Utc::now()).unwrap_err();
        assert!(matches!(err, SettlementError::FixtureMismatch { found: 7, .. }));
    }

    #[tokio::test]
    async fn test_engine_commits_batch() {
        let (input, alice, bob) = moneyline_input();
        let mut store = MockSettlementStore::new();
        store
            .expect_load_settlement_input()
            .withf(|match_id, kind| *match_id == 42 && *kind == MarketKind::Moneyline)
            .times(1)
            .returning(move |_, _| Ok(input.clone()));
        store
            .expect_commit_settlement()
            .withf(move |batch| {
                batch.credits.len() == 2
                    && batch.credits[&alice] == dec!(250.00)
                    && batch.credits[&bob] == dec!(25.00)
                    && batch.market_ids.len() == 3
            })
            .times(1)
            .returning(|_| Ok(()));

        let engine = SettlementEngine::new(store);
        let report = engine.settle_kind(42, MarketKind::Moneyline).await.unwrap();

        assert_eq!(report.settled_count, 3);
        assert_eq!(report.affected_user_count, 2);
        assert_eq!(report.total_paid, dec!(275.00));
    }

    #[tokio::test]
    async fn test_engine_skips_commit_without_markets() {
        let mut store = MockSettlementStore::new();
        store.expect_load_settlement_input().times(1).returning(|_, _| {
            Ok(SettlementInput {
                fixture: fixture(Some(ScorePair::new(0, 0))),
                markets: Vec::new(),
                wagers: Vec::new(),
            })
        });
        store.expect_commit_settlement().times(0);

        let engine = SettlementEngine::new(store);
        let report = engine.settle_kind(42, MarketKind::Total).await.unwrap();
        assert_eq!(report.settled_count, 0);
        assert_eq!(report.markets_settled, 0);
    }

    #[tokio::test]
    async fn test_engine_surfaces_store_failure() {
        let (input, _, _) = moneyline_input();
        let market_id = input.markets[0].id;
        let mut store = MockSettlementStore::new();
        store
            .expect_load_settlement_input()
            .returning(move |_, _| Ok(input.clone()));
        store
            .expect_commit_settlement()
            .returning(move |_| Err(StoreError::AlreadySettled(market_id)));

        let engine = SettlementEngine::new(store);
        let err = engine.settle_kind(42, MarketKind::Moneyline).await.unwrap_err();
        assert!(matches!(err, SettlementError::Store(StoreError::AlreadySettled(id)) if id == market_id));
    }

    #[tokio::test]
    async fn test_engine_settles_all_kinds() {
        let mut store = MockSettlementStore::new();
        store.expect_load_settlement_input().times(3).returning(|_, _| {
            Ok(SettlementInput {
                fixture: fixture(Some(ScorePair::new(1, 0))),
                markets: Vec::new(),
                wagers: Vec::new(),
            })
        });

        let engine = SettlementEngine::new(store);
        let reports = engine.settle_match(42).await.unwrap();
        let kinds: Vec<MarketKind> = reports.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, MarketKind::ALL.to_vec());
    }
}
