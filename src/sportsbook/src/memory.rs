//! In-process store backed by a single mutex.
//!
//! Every trait method validates against the whole ledger before touching it,
//! so a failed operation leaves no partial state. Used by tests and by tools
//! that replay settlements without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{FinalStats, Fixture, Market, MarketKind, MarketStatus, UserAccount, Wager};
use crate::placement::{
    validate_amend, validate_create, validate_withdraw, Candidate, MarketState, PlacementError,
    PlacementPolicy, PlacementReceipt, PlacementRequest,
};
use crate::settlement::{SettlementBatch, SettlementInput};
use crate::store::{SettlementStore, StoreError, WagerStore};

#[derive(Debug, Default)]
struct Ledger {
    users: HashMap<Uuid, UserAccount>,
    fixtures: HashMap<i64, Fixture>,
    markets: HashMap<Uuid, Market>,
    wagers: HashMap<Uuid, Wager>,
}

impl Ledger {
    fn balance(&self, user_id: Uuid) -> Result<Decimal, PlacementError> {
        self.users
            .get(&user_id)
            .map(|user| user.balance)
            .ok_or(PlacementError::UserNotFound(user_id))
    }

    fn credit(&mut self, user_id: Uuid, amount: Decimal) -> Result<Decimal, PlacementError> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(PlacementError::UserNotFound(user_id))?;
        user.balance += amount;
        Ok(user.balance)
    }

    fn market_state(&self, market_id: Uuid) -> Result<MarketState, PlacementError> {
        let market = self
            .markets
            .get(&market_id)
            .ok_or(PlacementError::MarketNotFound(market_id))?;
        let fixture = self
            .fixtures
            .get(&market.match_id)
            .ok_or(PlacementError::MarketNotFound(market_id))?;
        Ok(MarketState {
            market_id,
            status: market.status,
            kickoff: fixture.kickoff,
        })
    }

    fn has_wager(&self, user_id: Uuid, market_id: Uuid) -> bool {
        self.wagers
            .values()
            .any(|w| w.user_id == user_id && w.market_id == market_id)
    }

    fn owned_wager(&self, user_id: Uuid, wager_id: Uuid) -> Result<Wager, PlacementError> {
        self.wagers
            .get(&wager_id)
            .filter(|w| w.user_id == user_id)
            .cloned()
            .ok_or(PlacementError::WagerNotFound(wager_id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str, balance: Decimal) -> UserAccount {
        let user = UserAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            balance,
        };
        self.ledger.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_fixture(&self, fixture: Fixture) {
        self.ledger.lock().await.fixtures.insert(fixture.id, fixture);
    }

    /// Record final statistics. Returns false if the match already finished.
    pub async fn finish_fixture(
        &self,
        match_id: i64,
        stats: FinalStats,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut ledger = self.ledger.lock().await;
        let fixture = ledger
            .fixtures
            .get_mut(&match_id)
            .ok_or(StoreError::FixtureNotFound(match_id))?;
        Ok(fixture.finish(stats, at))
    }

    pub async fn add_market(&self, market: Market) -> Result<(), StoreError> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.fixtures.contains_key(&market.match_id) {
            return Err(StoreError::FixtureNotFound(market.match_id));
        }
        ledger.markets.insert(market.id, market);
        Ok(())
    }

    /// Insert a wager as-is, without charging the user.
    pub async fn add_wager(&self, wager: Wager) {
        self.ledger.lock().await.wagers.insert(wager.id, wager);
    }

    pub async fn balance(&self, user_id: Uuid) -> Option<Decimal> {
        self.ledger.lock().await.users.get(&user_id).map(|u| u.balance)
    }

    pub async fn wager(&self, wager_id: Uuid) -> Option<Wager> {
        self.ledger.lock().await.wagers.get(&wager_id).cloned()
    }

    pub async fn market(&self, market_id: Uuid) -> Option<Market> {
        self.ledger.lock().await.markets.get(&market_id).cloned()
    }

    pub async fn wagers_of(&self, user_id: Uuid) -> Vec<Wager> {
        let ledger = self.ledger.lock().await;
        let mut wagers: Vec<Wager> = ledger
            .wagers
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        wagers.sort_by_key(|w| (w.created_at, w.id));
        wagers
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn load_settlement_input(
        &self,
        match_id: i64,
        kind: MarketKind,
    ) -> Result<SettlementInput, StoreError> {
        let ledger = self.ledger.lock().await;
        let fixture = ledger
            .fixtures
            .get(&match_id)
            .cloned()
            .ok_or(StoreError::FixtureNotFound(match_id))?;

        let mut markets: Vec<Market> = ledger
            .markets
            .values()
            .filter(|m| m.match_id == match_id && m.kind() == kind && !m.is_settled())
            .cloned()
            .collect();
        markets.sort_by_key(|m| m.id);

        let mut wagers: Vec<Wager> = ledger
            .wagers
            .values()
            .filter(|w| markets.iter().any(|m| m.id == w.market_id))
            .cloned()
            .collect();
        wagers.sort_by_key(|w| (w.created_at, w.id));

        Ok(SettlementInput {
            fixture,
            markets,
            wagers,
        })
    }

    async fn commit_settlement(&self, batch: &SettlementBatch) -> Result<(), StoreError> {
        let mut ledger = self.ledger.lock().await;

        for market_id in &batch.market_ids {
            match ledger.markets.get(market_id) {
                Some(market) if !market.is_settled() => {}
                _ => return Err(StoreError::AlreadySettled(*market_id)),
            }
        }

        let unpaid = batch
            .payouts
            .iter()
            .filter(|p| {
                ledger
                    .wagers
                    .get(&p.wager_id)
                    .is_some_and(|w| w.payout.is_none())
            })
            .count();
        let credited_users = batch
            .credits
            .keys()
            .filter(|id| ledger.users.contains_key(id))
            .count();
        if unpaid != batch.payouts.len() || credited_users != batch.credits.len() {
            return Err(StoreError::StaleBatch {
                expected: batch.payouts.len(),
                updated: unpaid,
            });
        }

        for market_id in &batch.market_ids {
            if let Some(market) = ledger.markets.get_mut(market_id) {
                market.status = MarketStatus::Settled;
                market.settled_at = Some(batch.settled_at);
            }
        }
        for payout in &batch.payouts {
            if let Some(wager) = ledger.wagers.get_mut(&payout.wager_id) {
                wager.payout = Some(payout.payout);
            }
        }
        for (user_id, credit) in &batch.credits {
            if let Some(user) = ledger.users.get_mut(user_id) {
                user.balance += *credit;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl WagerStore for MemoryStore {
    async fn create_wagers(
        &self,
        request: &PlacementRequest,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError> {
        let mut ledger = self.ledger.lock().await;
        let balance = ledger.balance(request.user_id)?;

        let candidates = request
            .bets
            .iter()
            .map(|bet| -> Result<Candidate, PlacementError> {
                Ok(Candidate {
                    market: ledger.market_state(bet.market_id)?,
                    stake: bet.stake,
                    already_placed: ledger.has_wager(request.user_id, bet.market_id),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let debit = validate_create(policy, now, balance, &candidates)?;

        let mut wager_ids = Vec::with_capacity(request.bets.len());
        for bet in &request.bets {
            let wager = Wager {
                id: Uuid::new_v4(),
                user_id: request.user_id,
                market_id: bet.market_id,
                stake: bet.stake,
                payout: None,
                created_at: now,
            };
            wager_ids.push(wager.id);
            ledger.wagers.insert(wager.id, wager);
        }
        let balance = ledger.credit(request.user_id, -debit.charged)?;

        Ok(PlacementReceipt {
            user_id: request.user_id,
            wager_ids,
            balance_change: -debit.charged,
            balance,
        })
    }

    async fn amend_wager(
        &self,
        user_id: Uuid,
        wager_id: Uuid,
        new_stake: Decimal,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError> {
        let mut ledger = self.ledger.lock().await;
        let balance = ledger.balance(user_id)?;
        let wager = ledger.owned_wager(user_id, wager_id)?;
        let market = ledger.market_state(wager.market_id)?;

        let change = validate_amend(policy, now, balance, &market, wager.stake, new_stake)?;

        if let Some(wager) = ledger.wagers.get_mut(&wager_id) {
            wager.stake = new_stake;
        }
        let balance = ledger.credit(user_id, change)?;

        Ok(PlacementReceipt {
            user_id,
            wager_ids: vec![wager_id],
            balance_change: change,
            balance,
        })
    }

    async fn withdraw_wager(
        &self,
        user_id: Uuid,
        wager_id: Uuid,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError> {
        let mut ledger = self.ledger.lock().await;
        ledger.balance(user_id)?;
        let wager = ledger.owned_wager(user_id, wager_id)?;
        let market = ledger.market_state(wager.market_id)?;

        let refund = validate_withdraw(policy, now, &market, wager.stake)?;

        ledger.wagers.remove(&wager_id);
        let balance = ledger.credit(user_id, refund)?;

        Ok(PlacementReceipt {
            user_id,
            wager_ids: vec![wager_id],
            balance_change: refund,
            balance,
        })
    }
}
