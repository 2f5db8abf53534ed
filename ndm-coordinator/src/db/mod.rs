//! Status ledger storage
//!
//! The ledger is this service's own SQLite file, separate from the legacy
//! catalog. Its schema is created on first run.

pub mod ledger;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoordinatorError, CoordinatorResult};

pub use ledger::StatusLedger;

/// Open (creating if needed) the ledger database and its tables
pub async fn open_ledger_pool(db_path: &Path) -> CoordinatorResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoordinatorError::LedgerUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    tracing::debug!("Connecting to ledger: {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create ledger tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> CoordinatorResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_records (
            item_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            media_type TEXT NOT NULL,
            manager TEXT NOT NULL,
            state TEXT NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_error TEXT,
            found_in_manager INTEGER,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(CoordinatorError::ledger_unavailable)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_migration_records_state ON migration_records(state)")
        .execute(pool)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

    tracing::info!("Ledger tables initialized (migration_records)");

    Ok(())
}
