//! Sportsbook core for soccer betting.
//!
//! Provides:
//! - Odds conversion and Asian handicap lines
//! - Match result resolution and per-wager payouts
//! - Batch settlement and wager placement against a store
//! - PostgreSQL and in-memory stores
//! - Market import from bookmaker offers
//! - Configuration loading from .env

pub mod config;
pub mod db;
pub mod import;
pub mod line;
pub mod memory;
pub mod models;
pub mod odds;
pub mod payout;
pub mod placement;
pub mod repository;
pub mod resolver;
pub mod settlement;
pub mod store;

pub use config::Config;
pub use db::Database;
pub use import::{parse_offer, plan_import, ImportPlan, NewMarket, OfferedMarket};
pub use line::Line;
pub use memory::MemoryStore;
pub use models::{
    BetObject, Direction, FinalStats, Fixture, Market, MarketKind, MarketStatus, MatchStatus,
    Period, ScorePair, Selection, Side, UserAccount, Wager,
};
pub use odds::{to_american, to_payout_multiplier, AmericanOdd};
pub use payout::compute_payout;
pub use placement::{PlacementDesk, PlacementError, PlacementPolicy, PlacementReceipt, PlacementRequest, StakeRequest};
pub use repository::PgStore;
pub use resolver::{resolve, resolve_outcome, ResolveError};
pub use settlement::{settle, SettlementEngine, SettlementError, SettlementReport};
pub use store::{SettlementStore, StoreError, WagerStore};
