//! One pass over finished matches: prune, settle, purge.

use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use sportsbook::repository::{
    delete_unwagered_markets, finished_matches_with_unsettled_markets, purge_finished_matches,
};
use sportsbook::{Database, PgStore, SettlementEngine};

use crate::metrics::CycleReport;

pub struct Settler {
    db: Database,
    engine: SettlementEngine<PgStore>,
    /// How long finished matches are kept; `None` disables cleanup.
    retention: Option<Duration>,
}

impl Settler {
    pub fn new(db: Database, retention: Option<Duration>) -> Self {
        let engine = SettlementEngine::new(PgStore::new(db.pool().clone()));
        Self {
            db,
            engine,
            retention,
        }
    }

    /// Run one cycle. Only the initial match query can fail the cycle; a
    /// match that fails to settle is logged and picked up again next cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_start = Instant::now();
        let pool = self.db.pool();
        let mut cycle = CycleReport::new();

        let query_start = Instant::now();
        let match_ids = finished_matches_with_unsettled_markets(pool).await?;
        cycle.query_ms = query_start.elapsed().as_millis() as u64;
        cycle.matches_found = match_ids.len();

        for match_id in match_ids {
            if self.retention.is_some() {
                let prune_start = Instant::now();
                match delete_unwagered_markets(pool, match_id).await {
                    Ok(0) => {}
                    Ok(deleted) => {
                        info!("[CLEANUP] Match {}: removed {} markets without bets", match_id, deleted);
                        cycle.markets_pruned += deleted;
                    }
                    Err(e) => warn!("[CLEANUP] Match {}: failed to remove empty markets: {}", match_id, e),
                }
                cycle.prune_ms += prune_start.elapsed().as_millis() as u64;
            }

            let settle_start = Instant::now();
            match self.engine.settle_match(match_id).await {
                Ok(reports) => cycle.record_match(&reports),
                Err(e) => {
                    cycle.matches_failed += 1;
                    error!("[SETTLE] Match {} failed, retrying next cycle: {}", match_id, e);
                }
            }
            cycle.settle_ms += settle_start.elapsed().as_millis() as u64;
        }

        if let Some(retention) = self.retention {
            let purge_start = Instant::now();
            let cutoff = Utc::now() - retention;
            match purge_finished_matches(pool, cutoff).await {
                Ok(0) => {}
                Ok(purged) => {
                    info!("[CLEANUP] Purged {} matches finished before {}", purged, cutoff);
                    cycle.matches_purged = purged;
                }
                Err(e) => warn!("[CLEANUP] Failed to purge old matches: {}", e),
            }
            cycle.purge_ms = purge_start.elapsed().as_millis() as u64;
        }

        cycle.total_cycle_ms = cycle_start.elapsed().as_millis() as u64;
        Ok(cycle)
    }
}
