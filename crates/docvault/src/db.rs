//! SQLite connection setup

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::VaultConfig;
use crate::migrations;

/// Connect to the configured database and run migrations
pub async fn connect(config: &VaultConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;
    tracing::info!("Connected to SQLite: {}", config.database_url);

    migrations::run_migration(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    // The database lives only as long as its one connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrations::run_migration(&pool).await?;
    Ok(pool)
}

/// Ping the database to check connection
pub async fn ping(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
