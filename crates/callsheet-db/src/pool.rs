//! Pool construction, migrations and liveness checks.

use std::time::Duration;

use callsheet_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::DbError;

/// Relative to this crate's manifest: `<workspace-root>/migrations/`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Pool sizing as configured; `min_connections` never exceeds the max.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let max_connections = config.db_max_connections.max(1);
        Self {
            max_connections,
            min_connections: config.db_min_connections.min(max_connections),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }
}

/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await?;
    tracing::debug!(
        max = config.max_connections,
        min = config.min_connections,
        "db: pool connected"
    );
    Ok(pool)
}

/// Apply pending migrations and return how many ran.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied = applied_migrations(pool).await.saturating_sub(before);
    if applied > 0 {
        tracing::info!(applied, "db: migrations applied");
    }
    Ok(applied)
}

/// Zero on a fresh database, where the bookkeeping table is absent.
async fn applied_migrations(pool: &PgPool) -> usize {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// # Errors
///
/// Returns [`sqlx::Error`] if the round trip fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// [`ping`] with the error mapped into [`DbError`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database is unreachable.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    Ok(ping(pool).await?)
}
