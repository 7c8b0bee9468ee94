//! Storage traits for the settlement and placement units of work.
//!
//! Each trait method is one atomic unit: either every change it makes
//! (wager rows, market status, user balances) commits, or none does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{MarketKind, ModelError};
use crate::placement::{PlacementError, PlacementPolicy, PlacementReceipt, PlacementRequest};
use crate::settlement::{SettlementBatch, SettlementInput};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Match {0} not found")]
    FixtureNotFound(i64),

    #[error("Market {0} is already settled")]
    AlreadySettled(Uuid),

    #[error("Wagers changed since the batch was loaded: expected {expected}, updated {updated}")]
    StaleBatch { expected: usize, updated: usize },

    #[error("Corrupt row: {0}")]
    Corrupt(#[from] ModelError),
}

/// Reads wagers to settle and commits settlement batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// The fixture, its unsettled markets of `kind`, and every wager on them.
    async fn load_settlement_input(
        &self,
        match_id: i64,
        kind: MarketKind,
    ) -> Result<SettlementInput, StoreError>;

    /// Write payouts, credit balances and mark the covered markets settled.
    /// Fails without writing anything if any covered market is already settled.
    async fn commit_settlement(&self, batch: &SettlementBatch) -> Result<(), StoreError>;
}

/// Validates and applies wager placement, amendment and withdrawal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WagerStore: Send + Sync {
    async fn create_wagers(
        &self,
        request: &PlacementRequest,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError>;

    async fn amend_wager(
        &self,
        user_id: Uuid,
        wager_id: Uuid,
        new_stake: Decimal,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError>;

    async fn withdraw_wager(
        &self,
        user_id: Uuid,
        wager_id: Uuid,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError>;
}
