//! Wager placement, amendment and withdrawal rules.
//!
//! The `validate_*` functions decide whether an operation is allowed and how
//! much the balance moves. Stores call them inside the transaction that holds
//! the user's row lock, then apply the result.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::MarketStatus;
use crate::store::{StoreError, WagerStore};

/// Fee charged on top of every stake (5%).
pub const DEFAULT_FEE_RATE: Decimal = dec!(0.05);

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("Market {market_id} has already been settled")]
    MarketAlreadySettled { market_id: Uuid },

    #[error("Betting on market {market_id} closed at {closes_at} (match begins at {kickoff})")]
    BettingWindowClosed {
        market_id: Uuid,
        kickoff: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    },

    #[error("A bet on market {market_id} has already been placed")]
    DuplicateWager { market_id: Uuid },

    #[error("Insufficient balance: balance ${balance}, required ${required}")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("Stake {0} must be positive with at most 2 decimal places")]
    InvalidStake(Decimal),

    #[error("No bets to place")]
    EmptyBatch,

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Market {0} not found")]
    MarketNotFound(Uuid),

    #[error("Wager {0} not found")]
    WagerNotFound(Uuid),

    #[error("Operation failed, retry: {0}")]
    Storage(#[from] StoreError),
}

impl From<sqlx::Error> for PlacementError {
    fn from(err: sqlx::Error) -> Self {
        PlacementError::Storage(StoreError::Database(err))
    }
}

/// Fee and cutoff applied to every placement operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPolicy {
    /// Fee rate on top of the stake (e.g., 0.05 = 5%)
    pub fee_rate: Decimal,
    /// How long before kickoff the betting window closes
    pub cutoff: Duration,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            cutoff: Duration::zero(),
        }
    }
}

impl PlacementPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fee_rate: config.placement_fee_rate,
            cutoff: Duration::minutes(config.betting_cutoff_mins),
        }
    }

    /// Amount debited for a stake, fee included, rounded to cents.
    pub fn charge(&self, stake: Decimal) -> Decimal {
        (stake * (Decimal::ONE + self.fee_rate)).round_dp(2)
    }

    pub fn closes_at(&self, kickoff: DateTime<Utc>) -> DateTime<Utc> {
        kickoff - self.cutoff
    }

    fn check_open(&self, now: DateTime<Utc>, market: &MarketState) -> Result<(), PlacementError> {
        if market.status == MarketStatus::Settled {
            return Err(PlacementError::MarketAlreadySettled {
                market_id: market.market_id,
            });
        }

        let closes_at = self.closes_at(market.kickoff);
        if now >= closes_at {
            return Err(PlacementError::BettingWindowClosed {
                market_id: market.market_id,
                kickoff: market.kickoff,
                closes_at,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeRequest {
    pub market_id: Uuid,
    pub stake: Decimal,
}

/// One or more new bets for a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub user_id: Uuid,
    pub bets: Vec<StakeRequest>,
}

/// Market status and kickoff as read inside the placement transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketState {
    pub market_id: Uuid,
    pub status: MarketStatus,
    pub kickoff: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub market: MarketState,
    pub stake: Decimal,
    /// The user already holds a wager on this market.
    pub already_placed: bool,
}

/// Balance debit for a validated batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    pub total_stake: Decimal,
    pub charged: Decimal,
}

/// Outcome of a successful placement operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementReceipt {
    pub user_id: Uuid,
    pub wager_ids: Vec<Uuid>,
    /// Signed change applied to the balance.
    pub balance_change: Decimal,
    /// Balance after the operation.
    pub balance: Decimal,
}

pub fn validate_stake(stake: Decimal) -> Result<(), PlacementError> {
    if stake <= Decimal::ZERO || stake.round_dp(2) != stake {
        return Err(PlacementError::InvalidStake(stake));
    }
    Ok(())
}

/// Validate a batch of new bets and compute the debit.
pub fn validate_create(
    policy: &PlacementPolicy,
    now: DateTime<Utc>,
    balance: Decimal,
    candidates: &[Candidate],
) -> Result<Debit, PlacementError> {
    if candidates.is_empty() {
        return Err(PlacementError::EmptyBatch);
    }

    let mut markets = HashSet::with_capacity(candidates.len());
    let mut total_stake = Decimal::ZERO;
    let mut charged = Decimal::ZERO;

    for candidate in candidates {
        validate_stake(candidate.stake)?;
        policy.check_open(now, &candidate.market)?;

        let market_id = candidate.market.market_id;
        if candidate.already_placed || !markets.insert(market_id) {
            return Err(PlacementError::DuplicateWager { market_id });
        }

        total_stake += candidate.stake;
        // Per wager, so each later withdrawal refunds exactly what it cost.
        charged += policy.charge(candidate.stake);
    }

    if balance < charged {
        return Err(PlacementError::InsufficientBalance {
            balance,
            required: charged,
        });
    }

    Ok(Debit {
        total_stake,
        charged,
    })
}

/// Validate a stake change and return the signed balance change.
///
/// The old stake is refunded with its fee and the new stake charged with its
/// fee; only the net extra amount needs to be covered by the balance.
pub fn validate_amend(
    policy: &PlacementPolicy,
    now: DateTime<Utc>,
    balance: Decimal,
    market: &MarketState,
    old_stake: Decimal,
    new_stake: Decimal,
) -> Result<Decimal, PlacementError> {
    validate_stake(new_stake)?;
    policy.check_open(now, market)?;

    let required = policy.charge(new_stake) - policy.charge(old_stake);
    if required > balance {
        return Err(PlacementError::InsufficientBalance {
            balance: balance + policy.charge(old_stake),
            required: policy.charge(new_stake),
        });
    }

    Ok(-required)
}

/// Validate a withdrawal and return the refund (stake plus fee).
pub fn validate_withdraw(
    policy: &PlacementPolicy,
    now: DateTime<Utc>,
    market: &MarketState,
    stake: Decimal,
) -> Result<Decimal, PlacementError> {
    policy.check_open(now, market)?;
    Ok(policy.charge(stake))
}

/// Entry point for user-facing bet operations.
pub struct PlacementDesk<S> {
    store: S,
    policy: PlacementPolicy,
}

impl<S: WagerStore> PlacementDesk<S> {
    pub fn new(store: S, policy: PlacementPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PlacementPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Place one or more bets for a user, all or nothing.
    pub async fn place(&self, request: &PlacementRequest) -> Result<PlacementReceipt, PlacementError> {
        let result = self
            .store
            .create_wagers(request, &self.policy, Utc::now())
            .await;

        match &result {
            Ok(receipt) => info!(
                "[PLACE] User {} placed {} bets, charged ${}, balance ${}",
                request.user_id,
                receipt.wager_ids.len(),
                -receipt.balance_change,
                receipt.balance
            ),
            Err(e) => warn!("[PLACE] User {} placement rejected: {}", request.user_id, e),
        }

        result
    }

    /// Change the stake of an existing bet.
    pub async fn amend(
        &self,
        user_id: Uuid,
        wager_id: Uuid,
        new_stake: Decimal,
    ) -> Result<PlacementReceipt, PlacementError> {
        let result = self
            .store
            .amend_wager(user_id, wager_id, new_stake, &self.policy, Utc::now())
            .await;

        match &result {
            Ok(receipt) => info!(
                "[PLACE] User {} amended wager {} to ${}, balance ${}",
                user_id, wager_id, new_stake, receipt.balance
            ),
            Err(e) => warn!("[PLACE] User {} amendment of {} rejected: {}", user_id, wager_id, e),
        }

        result
    }

    /// Withdraw a bet and refund its stake plus fee.
    pub async fn withdraw(&self, user_id: Uuid, wager_id: Uuid) -> Result<PlacementReceipt, PlacementError> {
        let result = self
            .store
            .withdraw_wager(user_id, wager_id, &self.policy, Utc::now())
            .await;

        match &result {
            Ok(receipt) => info!(
                "[PLACE] User {} withdrew wager {}, refunded ${}",
                user_id, wager_id, receipt.balance_change
            ),
            Err(e) => warn!("[PLACE] User {} withdrawal of {} rejected: {}", user_id, wager_id, e),
        }

        result
    }
}
