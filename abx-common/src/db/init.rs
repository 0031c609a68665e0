//! Database initialization
//!
//! Creates the database on first run and applies the schema idempotently
//! (`CREATE TABLE IF NOT EXISTS`), so startup is safe to repeat.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc creates the database file if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_and_migrate(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the full schema applied.
///
/// Used by integration tests; a single connection keeps the in-memory
/// database alive for the lifetime of the pool.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_and_migrate(&pool).await?;

    Ok(pool)
}

async fn configure_and_migrate(pool: &SqlitePool) -> Result<()> {
    // Foreign keys must be enabled per connection for cascade deletes
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_tests_table(pool).await?;
    create_variants_table(pool).await?;
    create_events_table(pool).await?;

    Ok(())
}

/// Create the tests table
///
/// One row per experiment. `winning_variant_id` is set only when a test
/// is completed with an explicit winner.
async fn create_tests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tests (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            test_type TEXT NOT NULL CHECK (test_type IN ('landing_page', 'email_subject', 'email_content')),
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'running', 'paused', 'completed')),
            winning_variant_id TEXT,
            start_date TIMESTAMP,
            end_date TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tests_status ON tests(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tests_type ON tests(test_type)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the variants table
///
/// Running counters live here and are the source of truth for scoring.
/// `conversion_rate` is denormalized and recomputed on each conversion.
async fn create_variants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS variants (
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            variant_kind TEXT NOT NULL CHECK (variant_kind IN ('control', 'variant_a', 'variant_b', 'variant_c')),
            traffic_split REAL NOT NULL DEFAULT 0 CHECK (traffic_split >= 0 AND traffic_split <= 100),
            impressions INTEGER NOT NULL DEFAULT 0 CHECK (impressions >= 0),
            conversions INTEGER NOT NULL DEFAULT 0 CHECK (conversions >= 0),
            conversion_rate REAL NOT NULL DEFAULT 0,
            revenue_generated REAL NOT NULL DEFAULT 0 CHECK (revenue_generated >= 0),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_variants_test_id ON variants(test_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the events table
///
/// Append-only audit log. Counters on the variants table are incremented
/// alongside event insertion rather than derived from this log.
async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
            variant_id TEXT NOT NULL REFERENCES variants(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL CHECK (event_type IN ('impression', 'conversion')),
            user_identifier TEXT,
            conversion_value REAL,
            metadata TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_test_id ON events(test_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_variant_id ON events(variant_id)")
        .execute(pool)
        .await?;

    Ok(())
}
