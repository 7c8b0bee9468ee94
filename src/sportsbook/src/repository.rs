//! PostgreSQL persistence: the store implementations plus the fixture,
//! market and housekeeping queries used by the settler.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::import::NewMarket;
use crate::models::{
    FinalStats, Fixture, FixtureRow, Market, MarketIdentity, MarketKind, MarketRow, MarketStatus,
    ScorePair, UserAccount, Wager,
};
use crate::placement::{
    validate_amend, validate_create, validate_withdraw, Candidate, MarketState, PlacementError,
    PlacementPolicy, PlacementReceipt, PlacementRequest,
};
use crate::settlement::{SettlementBatch, SettlementInput};
use crate::store::{SettlementStore, StoreError, WagerStore};

/// Store backed by a PostgreSQL pool. Each trait call runs in one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    async fn load_settlement_input(
        &self,
        match_id: i64,
        kind: MarketKind,
    ) -> Result<SettlementInput, StoreError> {
        let mut tx = self.pool.begin().await?;
        // One snapshot for fixture, markets and wagers.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let fixture = fetch_fixture(&mut tx, match_id)
            .await?
            .ok_or(StoreError::FixtureNotFound(match_id))?;

        let markets = sqlx::query_as::<_, MarketRow>(
            r#"
            SELECT id, match_id, kind, period, object, selection, line, odd, status, settled_at
            FROM markets
            WHERE match_id = $1 AND kind = $2 AND status = 'unsettled'
            ORDER BY id
            "#,
        )
        .bind(match_id)
        .bind(kind.as_str())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Market::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let market_ids: Vec<Uuid> = markets.iter().map(|m| m.id).collect();
        let wagers = sqlx::query_as::<_, Wager>(
            r#"
            SELECT id, user_id, market_id, stake, payout, created_at
            FROM wagers
            WHERE market_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(&market_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SettlementInput {
            fixture,
            markets,
            wagers,
        })
    }

    async fn commit_settlement(&self, batch: &SettlementBatch) -> Result<(), StoreError> {
        let market_ids: Vec<Uuid> = batch.market_ids.iter().copied().collect();
        let user_ids: Vec<Uuid> = batch.credits.keys().copied().collect();
        let credits: Vec<Decimal> = batch.credits.values().copied().collect();
        let wager_ids: Vec<Uuid> = batch.payouts.iter().map(|p| p.wager_id).collect();
        let payouts: Vec<Decimal> = batch.payouts.iter().map(|p| p.payout).collect();

        let mut tx = self.pool.begin().await?;

        // Users first, in id order, matching the placement lock order.
        sqlx::query("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&user_ids)
            .fetch_all(&mut *tx)
            .await?;

        let settled: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE markets
            SET status = 'settled', settled_at = $2
            WHERE id = ANY($1) AND status = 'unsettled'
            RETURNING id
            "#,
        )
        .bind(&market_ids)
        .bind(batch.settled_at)
        .fetch_all(&mut *tx)
        .await?;

        if settled.len() != market_ids.len() {
            let settled: HashSet<Uuid> = settled.into_iter().collect();
            let market_id = market_ids
                .iter()
                .find(|id| !settled.contains(id))
                .copied()
                .unwrap_or_default();
            // Dropping the transaction rolls it back.
            return Err(StoreError::AlreadySettled(market_id));
        }

        let updated = sqlx::query(
            r#"
            UPDATE wagers AS w
            SET payout = v.payout
            FROM UNNEST($1::uuid[], $2::numeric[]) AS v(id, payout)
            WHERE w.id = v.id AND w.payout IS NULL
            "#,
        )
        .bind(&wager_ids)
        .bind(&payouts)
        .execute(&mut *tx)
        .await?
        .rows_affected() as usize;

        if updated != wager_ids.len() {
            return Err(StoreError::StaleBatch {
                expected: wager_ids.len(),
                updated,
            });
        }

        sqlx::query(
            r#"
            UPDATE users AS u
            SET balance = u.balance + v.credit
            FROM UNNEST($1::uuid[], $2::numeric[]) AS v(id, credit)
            WHERE u.id = v.id
            "#,
        )
        .bind(&user_ids)
        .bind(&credits)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "[SETTLE] Committed match {} {}: {} markets, {} wagers, {} users",
            batch.match_id,
            batch.kind,
            market_ids.len(),
            wager_ids.len(),
            user_ids.len()
        );

        Ok(())
    }
}

#[async_trait]
impl WagerStore for PgStore {
    async fn create_wagers(
        &self,
        request: &PlacementRequest,
        policy: &PlacementPolicy,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, PlacementError> {
        let user_id = request.user_id;
        let market_ids: Vec<Uuid> = request.bets.iter().map(|b| b.market_id).collect();

        let mut tx = self.pool.begin().await?;
        let balance = lock_balance(&mut tx, user_id).await?;
        let states = market_states(&mut tx, &market_ids).await?;

        let placed: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
            "SELECT market_id FROM wagers WHERE user_id = $1 AND market_id = ANY($2)",
        )
        .bind(user_id)
        .bind(&market_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let candidates = request
            .bets
            .iter()
            .map(|bet| -> Result<Candidate, PlacementError> {
                Ok(Candidate {
                    market: states
                        .get(&bet.market_id)
                        .cloned()
                        .ok_or(PlacementError::MarketNotFound(bet.market_id))?,
                    stake: bet.stake,
                    already_placed: placed.contains(&bet.market_id),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let debit = validate_create(policy, now, balance, &candidates)?;

        let wager_ids: Vec<Uuid> = request.bets.iter().map(|_| Uuid::new_v4()).collect();
        let stakes: Vec<Decimal> = request.bets.iter().map(|b| b.stake).collect();
        sqlx::query(
            r#"
            INSERT INTO wagers (id, user_id, market_id, stake, created_at)
            SELECT v.id, $2, v.market_id, v.stake, $3
            FROM UNNEST($1::uuid[], $4::uuid[], $5::numeric[]) AS v(id, market_id, stake)
            "#,
        )
        .bind(&wager_ids)
        .bind(user_id)
        .bind(now)
        .bind(&market_ids)
        .bind(&stakes)
        .execute(&mut *tx)
        .await?;

        let balance = adjust_balance(&mut tx, user_id, -debit.charged).await?;
        tx.commit().await?;

        Ok(PlacementReceipt {
            user_id,
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
        let mut tx = self.pool.begin().await?;
        let balance = lock_balance(&mut tx, user_id).await?;
        let wager = lock_owned_wager(&mut tx, user_id, wager_id).await?;
        let market = market_state(&mut tx, wager.market_id).await?;

        let change = validate_amend(policy, now, balance, &market, wager.stake, new_stake)?;

        sqlx::query("UPDATE wagers SET stake = $2 WHERE id = $1")
            .bind(wager_id)
            .bind(new_stake)
            .execute(&mut *tx)
            .await?;
        let balance = adjust_balance(&mut tx, user_id, change).await?;
        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;
        lock_balance(&mut tx, user_id).await?;
        let wager = lock_owned_wager(&mut tx, user_id, wager_id).await?;
        let market = market_state(&mut tx, wager.market_id).await?;

        let refund = validate_withdraw(policy, now, &market, wager.stake)?;

        sqlx::query("DELETE FROM wagers WHERE id = $1")
            .bind(wager_id)
            .execute(&mut *tx)
            .await?;
        let balance = adjust_balance(&mut tx, user_id, refund).await?;
        tx.commit().await?;

        Ok(PlacementReceipt {
            user_id,
            wager_ids: vec![wager_id],
            balance_change: refund,
            balance,
        })
    }
}

async fn fetch_fixture(conn: &mut PgConnection, match_id: i64) -> Result<Option<Fixture>, StoreError> {
    let row = sqlx::query_as::<_, FixtureRow>(
        r#"
        SELECT id, league, home_team, away_team, kickoff, status, finished_at,
               halftime_score, fulltime_score, corners, cards
        FROM matches
        WHERE id = $1
        "#,
    )
    .bind(match_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Fixture::try_from).transpose()?)
}

/// Lock the user's row for the rest of the transaction and read the balance.
async fn lock_balance(conn: &mut PgConnection, user_id: Uuid) -> Result<Decimal, PlacementError> {
    sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(PlacementError::UserNotFound(user_id))
}

async fn adjust_balance(
    conn: &mut PgConnection,
    user_id: Uuid,
    change: Decimal,
) -> Result<Decimal, PlacementError> {
    let balance = sqlx::query_scalar("UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance")
        .bind(user_id)
        .bind(change)
        .fetch_one(&mut *conn)
        .await?;
    Ok(balance)
}

async fn lock_owned_wager(
    conn: &mut PgConnection,
    user_id: Uuid,
    wager_id: Uuid,
) -> Result<Wager, PlacementError> {
    sqlx::query_as::<_, Wager>(
        r#"
        SELECT id, user_id, market_id, stake, payout, created_at
        FROM wagers
        WHERE id = $1 AND user_id = $2
        FOR UPDATE
        "#,
    )
    .bind(wager_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(PlacementError::WagerNotFound(wager_id))
}

/// Status and kickoff of the given markets, share-locked against settlement.
async fn market_states(
    conn: &mut PgConnection,
    market_ids: &[Uuid],
) -> Result<HashMap<Uuid, MarketState>, PlacementError> {
    let rows: Vec<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT m.id, m.status, x.kickoff
        FROM markets m
        JOIN matches x ON x.id = m.match_id
        WHERE m.id = ANY($1)
        FOR SHARE OF m
        "#,
    )
    .bind(market_ids)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(market_id, status, kickoff)| -> Result<(Uuid, MarketState), PlacementError> {
            let status: MarketStatus = status.parse().map_err(StoreError::from)?;
            Ok((
                market_id,
                MarketState {
                    market_id,
                    status,
                    kickoff,
                },
            ))
        })
        .collect()
}

async fn market_state(conn: &mut PgConnection, market_id: Uuid) -> Result<MarketState, PlacementError> {
    market_states(conn, &[market_id])
        .await?
        .remove(&market_id)
        .ok_or(PlacementError::MarketNotFound(market_id))
}

/// Create a user account with an opening balance.
pub async fn create_user(pool: &PgPool, username: &str, balance: Decimal) -> Result<UserAccount, sqlx::Error> {
    sqlx::query_as::<_, UserAccount>(
        r#"
        INSERT INTO users (id, username, balance)
        VALUES ($1, $2, $3)
        RETURNING id, username, balance
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(balance)
    .fetch_one(pool)
    .await
}

pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserAccount>, sqlx::Error> {
    sqlx::query_as::<_, UserAccount>("SELECT id, username, balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Insert a fixture, or refresh teams and kickoff of one not yet played.
pub async fn upsert_fixture(pool: &PgPool, fixture: &Fixture) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO matches (id, league, home_team, away_team, kickoff, status)
        VALUES ($1, $2, $3, $4, $5, 'not_started')
        ON CONFLICT (id) DO UPDATE SET
            league = EXCLUDED.league,
            home_team = EXCLUDED.home_team,
            away_team = EXCLUDED.away_team,
            kickoff = EXCLUDED.kickoff,
            updated_at = NOW()
        WHERE matches.status = 'not_started'
        "#,
    )
    .bind(fixture.id)
    .bind(&fixture.league)
    .bind(&fixture.home_team)
    .bind(&fixture.away_team)
    .bind(fixture.kickoff)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_fixture(pool: &PgPool, match_id: i64) -> Result<Option<Fixture>, StoreError> {
    let mut conn = pool.acquire().await?;
    fetch_fixture(&mut conn, match_id).await
}

/// Mark a match finished and store its final statistics.
/// Returns false if the match was already finished (or does not exist).
pub async fn record_final_stats(
    pool: &PgPool,
    match_id: i64,
    stats: &FinalStats,
    finished_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let pair = |p: Option<ScorePair>| p.map(|p| p.to_string());

    let result = sqlx::query(
        r#"
        UPDATE matches
        SET status = 'finished',
            finished_at = $2,
            halftime_score = $3,
            fulltime_score = $4,
            corners = $5,
            cards = $6,
            updated_at = NOW()
        WHERE id = $1 AND status = 'not_started'
        "#,
    )
    .bind(match_id)
    .bind(finished_at)
    .bind(pair(stats.halftime))
    .bind(pair(stats.fulltime))
    .bind(pair(stats.corners))
    .bind(pair(stats.cards))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Identities of every market already offered for a match.
pub async fn existing_identities(pool: &PgPool, match_id: i64) -> Result<HashSet<MarketIdentity>, StoreError> {
    let rows = sqlx::query_as::<_, MarketRow>(
        r#"
        SELECT id, match_id, kind, period, object, selection, line, odd, status, settled_at
        FROM markets
        WHERE match_id = $1
        "#,
    )
    .bind(match_id)
    .fetch_all(pool)
    .await?;

    let mut identities = HashSet::with_capacity(rows.len());
    for row in rows {
        identities.insert(Market::try_from(row)?.identity());
    }
    Ok(identities)
}

/// Insert new markets, skipping any whose identity already exists.
/// Returns the ids of the rows actually inserted.
pub async fn insert_markets(pool: &PgPool, markets: &[NewMarket]) -> Result<Vec<Uuid>, sqlx::Error> {
    if markets.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::with_capacity(markets.len());
    let mut match_ids = Vec::with_capacity(markets.len());
    let mut kinds = Vec::with_capacity(markets.len());
    let mut periods = Vec::with_capacity(markets.len());
    let mut objects = Vec::with_capacity(markets.len());
    let mut selections = Vec::with_capacity(markets.len());
    let mut lines = Vec::with_capacity(markets.len());
    let mut odds = Vec::with_capacity(markets.len());

    for market in markets {
        let (selection, line) = market.selection.columns();
        ids.push(Uuid::new_v4());
        match_ids.push(market.match_id);
        kinds.push(market.selection.kind().as_str().to_string());
        periods.push(market.period.as_str().to_string());
        objects.push(market.object.as_str().to_string());
        selections.push(selection.to_string());
        lines.push(line);
        odds.push(market.odd.value());
    }

    sqlx::query_scalar(
        r#"
        INSERT INTO markets (id, match_id, kind, period, object, selection, line, odd)
        SELECT * FROM UNNEST(
            $1::uuid[], $2::int8[], $3::text[], $4::text[],
            $5::text[], $6::text[], $7::numeric[], $8::int4[]
        )
        ON CONFLICT (match_id, kind, period, object, selection, line, odd) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&ids)
    .bind(&match_ids)
    .bind(&kinds)
    .bind(&periods)
    .bind(&objects)
    .bind(&selections)
    .bind(&lines)
    .bind(&odds)
    .fetch_all(pool)
    .await
}

/// Finished matches that still have unsettled markets, oldest first.
pub async fn finished_matches_with_unsettled_markets(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT x.id
        FROM matches x
        WHERE x.status = 'finished'
          AND EXISTS (
              SELECT 1 FROM markets m
              WHERE m.match_id = x.id AND m.status = 'unsettled'
          )
        ORDER BY x.finished_at, x.id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Delete unsettled markets of a match that nobody bet on.
pub async fn delete_unwagered_markets(pool: &PgPool, match_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM markets m
        WHERE m.match_id = $1
          AND m.status = 'unsettled'
          AND NOT EXISTS (SELECT 1 FROM wagers w WHERE w.market_id = m.id)
        "#,
    )
    .bind(match_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete fully settled matches finished before `cutoff`, together with
/// their markets and wagers.
pub async fn purge_finished_matches(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM matches x
        WHERE x.status = 'finished'
          AND x.finished_at < $1
          AND NOT EXISTS (
              SELECT 1 FROM markets m
              WHERE m.match_id = x.id AND m.status = 'unsettled'
          )
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BetObject, Period, Selection, Side};
    use crate::odds::AmericanOdd;
    use crate::placement::StakeRequest;
    use crate::settlement::SettlementEngine;
    use crate::{Config, Database};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn connect() -> Database {
        dotenvy::dotenv().ok();
        let config = Config::from_env().expect("Config should load");
        let db = Database::connect(&config).await.expect("DB should connect");
        db.migrate().await.expect("Migrations should apply");
        db
    }

    fn test_match_id() -> i64 {
        // Negative ids never collide with real fixtures.
        -((Uuid::new_v4().as_u128() >> 66) as i64) - 1
    }

    async fn cleanup(pool: &PgPool, match_id: i64, user_ids: &[Uuid]) {
        sqlx::query("DELETE FROM matches WHERE id = $1")
            .bind(match_id)
            .execute(pool)
            .await
            .expect("Cleanup should succeed");
        sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .execute(pool)
            .await
            .expect("Cleanup should succeed");
    }

    #[tokio::test]
    #[ignore = "requires a live PostgreSQL (DATABASE_URL)"]
    async fn test_record_final_stats_once() {
        let db = connect().await;
        let match_id = test_match_id();
        let fixture = Fixture::scheduled(match_id, "Bundesliga", "Bayern", "Dortmund", Utc::now());
        upsert_fixture(db.pool(), &fixture).await.expect("Upsert should succeed");

        let stats = FinalStats {
            fulltime: Some(ScorePair::new(3, 2)),
            ..Default::default()
        };
        assert!(record_final_stats(db.pool(), match_id, &stats, Utc::now()).await.unwrap());
        assert!(!record_final_stats(db.pool(), match_id, &FinalStats::default(), Utc::now())
            .await
            .unwrap());

        let stored = get_fixture(db.pool(), match_id).await.unwrap().expect("Fixture should exist");
        assert!(stored.is_finished());
        assert_eq!(stored.stats.fulltime, Some(ScorePair::new(3, 2)));

        cleanup(db.pool(), match_id, &[]).await;
    }

    #[tokio::test]
    #[ignore = "requires a live PostgreSQL (DATABASE_URL)"]
    async fn test_insert_markets_skips_existing() {
        let db = connect().await;
        let match_id = test_match_id();
        let fixture = Fixture::scheduled(match_id, "La Liga", "Sevilla", "Betis", Utc::now() + Duration::days(1));
        upsert_fixture(db.pool(), &fixture).await.unwrap();

        let market = NewMarket {
            match_id,
            period: Period::FullTime,
            object: BetObject::Goals,
            selection: Selection::handicap(Side::Home, dec!(-0.75)).unwrap(),
            odd: AmericanOdd::new(-115).unwrap(),
        };
        let inserted = insert_markets(db.pool(), &[market]).await.unwrap();
        assert_eq!(inserted.len(), 1);
        let inserted = insert_markets(db.pool(), &[market]).await.unwrap();
        assert!(inserted.is_empty());

        let identities = existing_identities(db.pool(), match_id).await.unwrap();
        assert!(identities.contains(&market.identity()));

        cleanup(db.pool(), match_id, &[]).await;
    }

    #[tokio::test]
    #[ignore = "requires a live PostgreSQL (DATABASE_URL)"]
    async fn test_place_and_settle_round_trip() {
        let db = connect().await;
        let store = PgStore::new(db.pool().clone());
        let match_id = test_match_id();
        let fixture = Fixture::scheduled(match_id, "Premier League", "Arsenal", "Chelsea", Utc::now() + Duration::hours(2));
        upsert_fixture(db.pool(), &fixture).await.unwrap();

        let home = NewMarket {
            match_id,
            period: Period::FullTime,
            object: BetObject::Goals,
            selection: Selection::moneyline(Side::Home),
            odd: AmericanOdd::new(150).unwrap(),
        };
        let draw = NewMarket {
            selection: Selection::moneyline(Side::Draw),
            odd: AmericanOdd::new(220).unwrap(),
            ..home
        };
        let ids = insert_markets(db.pool(), &[home, draw]).await.unwrap();
        let user = create_user(db.pool(), &format!("tester-{}", Uuid::new_v4()), dec!(1000))
            .await
            .unwrap();

        let request = PlacementRequest {
            user_id: user.id,
            bets: vec![StakeRequest {
                market_id: ids[0],
                stake: dec!(100),
            }],
        };
        let receipt = store
            .create_wagers(&request, &PlacementPolicy::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(receipt.balance, dec!(895.00));

        let err = store
            .create_wagers(&request, &PlacementPolicy::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::DuplicateWager { .. }));

        let stats = FinalStats {
            fulltime: Some(ScorePair::new(2, 1)),
            ..Default::default()
        };
        record_final_stats(db.pool(), match_id, &stats, Utc::now()).await.unwrap();
        assert_eq!(delete_unwagered_markets(db.pool(), match_id).await.unwrap(), 1);

        let engine = SettlementEngine::new(store.clone());
        let report = engine.settle_kind(match_id, MarketKind::Moneyline).await.unwrap();
        assert_eq!(report.settled_count, 1);

        let user = get_user(db.pool(), user.id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(1145.00));
        assert!(!finished_matches_with_unsettled_markets(db.pool())
            .await
            .unwrap()
            .contains(&match_id));

        // A second run finds nothing and pays nothing.
        let report = engine.settle_kind(match_id, MarketKind::Moneyline).await.unwrap();
        assert_eq!(report.settled_count, 0);

        cleanup(db.pool(), match_id, &[user.id]).await;
    }
}
