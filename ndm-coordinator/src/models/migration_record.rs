//! Ledger-side types: the per-item migration state machine
//!
//! `pending → in_progress → {succeeded | failed}`; `failed` may go back to
//! `in_progress` on retry. `succeeded` is terminal unless the user re-queues
//! the item, which the ledger performs as a separate reset operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Manager, MediaType};

/// Migration state of one catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl MigrationState {
    pub const ALL: [MigrationState; 4] = [
        MigrationState::Pending,
        MigrationState::InProgress,
        MigrationState::Succeeded,
        MigrationState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::InProgress => "in_progress",
            MigrationState::Succeeded => "succeeded",
            MigrationState::Failed => "failed",
        }
    }

    /// Whether a normal (non-reset) write may move a record from `self` to `next`
    ///
    /// Rewriting the current state is always allowed so that writes stay idempotent.
    pub fn can_transition_to(&self, next: MigrationState) -> bool {
        use MigrationState::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, InProgress)
                    | (InProgress, Succeeded)
                    | (InProgress, Failed)
                    | (Failed, InProgress)
            )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MigrationState::Pending),
            "in_progress" => Ok(MigrationState::InProgress),
            "succeeded" => Ok(MigrationState::Succeeded),
            "failed" => Ok(MigrationState::Failed),
            other => Err(format!("unknown migration state '{}'", other)),
        }
    }
}

/// Persistent migration record, one per touched catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub item_id: String,
    pub title: String,
    pub media_type: MediaType,
    pub manager: Manager,
    pub state: MigrationState,
    /// Number of transitions into `in_progress`; never decreases
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Whether the manager holds files for the item; `None` = not checked
    pub found_in_manager: Option<bool>,
    pub updated_at: DateTime<Utc>,
}
