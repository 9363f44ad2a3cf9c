mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type DbPool = SqlitePool;

/// Split a migration file into statements.
///
/// Comment lines are dropped before splitting on `;`, so a semicolon inside a
/// comment never produces a bogus statement.
fn split_statements(sql: &str) -> Vec<String> {
    let cleaned = sql
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    cleaned
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in split_statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("poppo.db");

    info!("Initializing database at {}", db_path.display());

    // Pragmas live on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a private in-memory database with the full schema applied.
///
/// The pool is pinned to a single connection that never idles out, since
/// every new SQLite memory connection would see an empty database.
pub async fn init_in_memory() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users and plushies
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Provider column for mirrored external identities
    let has_provider: Option<(String,)> =
        sqlx::query_as("SELECT name FROM pragma_table_info('users') WHERE name = 'provider'")
            .fetch_optional(pool)
            .await?;
    if has_provider.is_none() {
        execute_sql(
            pool,
            include_str!("../../migrations/002_external_identities.sql"),
        )
        .await?;
    }

    info!("Migrations completed");
    Ok(())
}
