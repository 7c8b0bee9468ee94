//! One-shot operator commands: fixture intake, result entry and market import.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use sportsbook::repository::{
    existing_identities, get_fixture, insert_markets, record_final_stats, upsert_fixture,
};
use sportsbook::{plan_import, Database, FinalStats, Fixture, OfferedMarket};

/// Register a fixture, or update the teams and kickoff of one not yet played.
pub async fn register_fixture(db: &Database, fixture: &Fixture) -> Result<()> {
    upsert_fixture(db.pool(), fixture).await?;
    info!(
        "[FIXTURE] {} {} vs {} at {}",
        fixture.id, fixture.home_team, fixture.away_team, fixture.kickoff
    );
    Ok(())
}

/// Record final statistics for a match. A match can only finish once.
pub async fn finish_match(
    db: &Database,
    match_id: i64,
    stats: &FinalStats,
    finished_at: DateTime<Utc>,
) -> Result<()> {
    if !record_final_stats(db.pool(), match_id, stats, finished_at).await? {
        bail!("Match {} does not exist or has already finished", match_id);
    }
    let fulltime = stats
        .fulltime
        .map(|score| score.to_string())
        .unwrap_or_else(|| "unreported".to_string());
    info!("[FIXTURE] Match {} finished ({})", match_id, fulltime);
    Ok(())
}

/// Parse a JSON array of bookmaker offers.
pub fn parse_offers(raw: &str) -> Result<Vec<OfferedMarket>> {
    serde_json::from_str(raw).context("Offers file must be a JSON array of offers")
}

/// Import offers for a match from a JSON file. Returns the number of markets
/// inserted.
pub async fn import_offers(db: &Database, match_id: i64, path: &Path) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read offers file: {:?}", path))?;
    let offers = parse_offers(&raw)?;

    if get_fixture(db.pool(), match_id).await?.is_none() {
        bail!("Match {} not found, register the fixture first", match_id);
    }

    let existing = existing_identities(db.pool(), match_id).await?;
    let plan = plan_import(match_id, &offers, &existing);
    let inserted = insert_markets(db.pool(), &plan.markets).await?;

    info!(
        "[IMPORT] Match {}: {} of {} offers stored",
        match_id,
        inserted.len(),
        offers.len()
    );
    Ok(inserted.len())
}
