//! Status Ledger: persistent migration record per catalog item
//!
//! Records are created lazily from a `CatalogItem`, so every stored id came
//! from the catalog. Each write is one transaction: the current state is read,
//! the transition is checked, and the row is written with a single upsert.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::models::{CatalogItem, LastError, MigrationRecord, MigrationState};

/// Error recorded on records demoted by [`StatusLedger::reconcile_orphans`]
pub const INTERRUPTED: &str = "interrupted";

const RECORD_COLUMNS: &str = "item_id, title, media_type, manager, state, attempt_count, \
     last_attempt_at, last_error, found_in_manager, updated_at";

/// Fixed-width UTC timestamps so that text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> CoordinatorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoordinatorError::LedgerUnavailable(format!("bad timestamp '{}': {}", value, e)))
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::LedgerUnavailable(format!("corrupt {} column: {}", column, err))
}

fn record_from_row(row: &SqliteRow) -> CoordinatorResult<MigrationRecord> {
    let get_str = |column: &str| -> CoordinatorResult<String> {
        row.try_get::<String, _>(column).map_err(|e| corrupt(column, e))
    };

    let last_attempt_at: Option<String> = row
        .try_get("last_attempt_at")
        .map_err(|e| corrupt("last_attempt_at", e))?;
    let attempt_count: i64 = row
        .try_get("attempt_count")
        .map_err(|e| corrupt("attempt_count", e))?;
    let found: Option<i64> = row
        .try_get("found_in_manager")
        .map_err(|e| corrupt("found_in_manager", e))?;

    Ok(MigrationRecord {
        item_id: get_str("item_id")?,
        title: get_str("title")?,
        media_type: get_str("media_type")?.parse().map_err(|e| corrupt("media_type", e))?,
        manager: get_str("manager")?.parse().map_err(|e| corrupt("manager", e))?,
        state: get_str("state")?.parse().map_err(|e| corrupt("state", e))?,
        attempt_count: u32::try_from(attempt_count).map_err(|e| corrupt("attempt_count", e))?,
        last_attempt_at: last_attempt_at.as_deref().map(parse_timestamp).transpose()?,
        last_error: row
            .try_get("last_error")
            .map_err(|e| corrupt("last_error", e))?,
        found_in_manager: found.map(|v| v != 0),
        updated_at: parse_timestamp(&get_str("updated_at")?)?,
    })
}

/// Handle to the ledger database
#[derive(Debug, Clone)]
pub struct StatusLedger {
    pool: SqlitePool,
}

impl StatusLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record for `id`, or `NotFound`
    pub async fn get(&self, id: &str) -> CoordinatorResult<MigrationRecord> {
        self.find(id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("no migration record for '{}'", id)))
    }

    /// Record for `id`, if one was ever created
    pub async fn find(&self, id: &str) -> CoordinatorResult<Option<MigrationRecord>> {
        let sql = format!("SELECT {} FROM migration_records WHERE item_id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Write `state` (and `error`) for an item
    ///
    /// Writing the same state twice leaves one record. The attempt count grows
    /// only on a transition into `in_progress`. Moving backwards through the
    /// state machine is rejected with `InvalidTransition`; use [`Self::reset`]
    /// for the user re-queue.
    pub async fn upsert(
        &self,
        item: &CatalogItem,
        state: MigrationState,
        error: Option<&str>,
    ) -> CoordinatorResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT state FROM migration_records WHERE item_id = ?")
                .bind(&item.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(CoordinatorError::ledger_unavailable)?;

        let current = current
            .map(|s| s.parse::<MigrationState>().map_err(|e| corrupt("state", e)))
            .transpose()?;

        if let Some(from) = current {
            if !from.can_transition_to(state) {
                return Err(CoordinatorError::InvalidTransition {
                    id: item.id.clone(),
                    from,
                    to: state,
                });
            }
        }

        let entering_in_progress =
            state == MigrationState::InProgress && current != Some(MigrationState::InProgress);
        let increment = i64::from(entering_in_progress);
        let now = timestamp(Utc::now());
        let attempt_at = entering_in_progress.then(|| now.clone());

        sqlx::query(
            r#"
            INSERT INTO migration_records (
                item_id, title, media_type, manager, state,
                attempt_count, last_attempt_at, last_error, found_in_manager, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                title = excluded.title,
                media_type = excluded.media_type,
                manager = excluded.manager,
                state = excluded.state,
                attempt_count = migration_records.attempt_count + ?,
                last_attempt_at = COALESCE(excluded.last_attempt_at, migration_records.last_attempt_at),
                last_error = excluded.last_error,
                found_in_manager = CASE
                    WHEN excluded.state = 'in_progress' THEN NULL
                    ELSE migration_records.found_in_manager
                END,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(item.display_title())
        .bind(item.media_type.as_str())
        .bind(item.manager().as_str())
        .bind(state.as_str())
        .bind(increment)
        .bind(&attempt_at)
        .bind(error)
        .bind(&now)
        .bind(increment)
        .execute(&mut *tx)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

        tx.commit()
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        Ok(())
    }

    /// Create `pending` records for items that have none; returns how many were created
    pub async fn enqueue(&self, items: &[CatalogItem]) -> CoordinatorResult<u64> {
        let now = timestamp(Utc::now());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        let mut created = 0;
        for item in items {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO migration_records (
                    item_id, title, media_type, manager, state, attempt_count, updated_at
                ) VALUES (?, ?, ?, ?, 'pending', 0, ?)
                "#,
            )
            .bind(&item.id)
            .bind(item.display_title())
            .bind(item.media_type.as_str())
            .bind(item.manager().as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

            created += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        Ok(created)
    }

    pub async fn list_by_state(&self, state: MigrationState) -> CoordinatorResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT {} FROM migration_records WHERE state = ? ORDER BY item_id",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn list_all(&self) -> CoordinatorResult<Vec<MigrationRecord>> {
        let sql = format!("SELECT {} FROM migration_records ORDER BY item_id", RECORD_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(CoordinatorError::ledger_unavailable)?;

        rows.iter().map(record_from_row).collect()
    }

    /// Demote every `in_progress` record to `failed("interrupted")`
    ///
    /// Run once at startup, before any batch is accepted: no process that
    /// could own those records survived the restart.
    pub async fn reconcile_orphans(&self) -> CoordinatorResult<u64> {
        let result = sqlx::query(
            "UPDATE migration_records SET state = 'failed', last_error = ?, updated_at = ? \
             WHERE state = 'in_progress'",
        )
        .bind(INTERRUPTED)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

        Ok(result.rows_affected())
    }

    /// User re-queue: back to `pending` with error and found flag cleared
    ///
    /// The attempt count is kept. Returns false when the id has no record.
    pub async fn reset(&self, id: &str) -> CoordinatorResult<bool> {
        let result = sqlx::query(
            "UPDATE migration_records \
             SET state = 'pending', last_error = NULL, found_in_manager = NULL, updated_at = ? \
             WHERE item_id = ?",
        )
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    /// Store whether the manager now holds files for the item
    pub async fn set_found(&self, id: &str, found: bool) -> CoordinatorResult<bool> {
        let result = sqlx::query(
            "UPDATE migration_records SET found_in_manager = ?, updated_at = ? WHERE item_id = ?",
        )
        .bind(found)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of records per state; states with no records are absent
    pub async fn count_by_state(&self) -> CoordinatorResult<HashMap<MigrationState, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM migration_records GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(CoordinatorError::ledger_unavailable)?;

        rows.into_iter()
            .map(|(state, count)| {
                let state = state.parse::<MigrationState>().map_err(|e| corrupt("state", e))?;
                Ok((state, count.max(0) as u64))
            })
            .collect()
    }

    /// Most recently written failure
    pub async fn latest_failure(&self) -> CoordinatorResult<Option<LastError>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT item_id, last_error, updated_at FROM migration_records \
             WHERE state = 'failed' AND last_error IS NOT NULL \
             ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(CoordinatorError::ledger_unavailable)?;

        row.map(|(item_id, message, at)| {
            Ok(LastError {
                item_id,
                message,
                at: parse_timestamp(&at)?,
            })
        })
        .transpose()
    }
}
