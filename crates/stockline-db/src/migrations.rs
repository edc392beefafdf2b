//! # Database Migrations
//!
//! Embedded SQL migrations for Stockline.
//!
//! ## Migration Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Migration Flow                                       │
//! │                                                                         │
//! │  Database::new()                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Check _sqlx_migrations table                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Run pending migrations in filename order                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Record checksum in _sqlx_migrations                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding Migrations
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Never modify an applied migration; add a new one

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
///
/// ```text
/// migrations/sqlite/
/// └── 001_initial_schema.sql  # Ledger, movements, alerts, reconciliation
/// ```
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
