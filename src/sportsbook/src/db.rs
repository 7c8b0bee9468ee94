//! PostgreSQL pool and schema migrations.

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

use crate::Config;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Shared handle to the sportsbook database.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool sized by `DB_MAX_CONNECTIONS`.
    pub async fn connect(config: &Config) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Bring the users, matches, markets and wagers tables up to date.
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("[DB] Schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a live PostgreSQL (DATABASE_URL)"]
    async fn test_connect_and_migrate() {
        let config = Config::from_env().expect("Config should load");
        let db = Database::connect(&config)
            .await
            .expect("Pool should open");

        db.health_check().await.expect("Health check should pass");
        db.migrate().await.expect("Migrations should apply");

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name IN ('users', 'matches', 'markets', 'wagers')",
        )
        .fetch_one(db.pool())
        .await
        .expect("Catalog query should succeed");
        assert_eq!(tables, 4);
    }
}
