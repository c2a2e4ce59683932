use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Opaque identity of one submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ActionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Accepted, not yet run.
    Pending,
    /// An attempt failed and another one follows.
    Retry,
    Success,
    Failure,
}

/// One entry in an action's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub status: TaskStatus,
    /// 1-based attempt number; 0 for records made outside an attempt.
    pub attempt: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn pending() -> Self {
        Self::new(TaskStatus::Pending, 0, None, None)
    }

    pub fn success(attempt: u32, result: serde_json::Value) -> Self {
        Self::new(TaskStatus::Success, attempt, Some(result), None)
    }

    pub fn retry(attempt: u32, error: impl fmt::Display) -> Self {
        Self::new(TaskStatus::Retry, attempt, None, Some(error.to_string()))
    }

    pub fn failure(attempt: u32, error: impl fmt::Display) -> Self {
        Self::new(TaskStatus::Failure, attempt, None, Some(error.to_string()))
    }

    fn new(
        status: TaskStatus,
        attempt: u32,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        Self {
            status,
            attempt,
            result,
            error,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.status, TaskStatus::Success | TaskStatus::Failure)
    }
}

/// Append-only map from action identity to its records.
///
/// Appends are atomic per call; nothing orders records of different actions.
/// The last record of an action is the authoritative one.
#[derive(Debug, Default)]
pub struct ResultLedger {
    entries: RwLock<HashMap<ActionId, Vec<ActionRecord>>>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, id: ActionId, record: ActionRecord) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .push(record);
    }

    /// Last recorded entry for an action.
    pub fn last(&self, id: &ActionId) -> Option<ActionRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|records| records.last().cloned())
    }

    /// Every entry recorded for an action, oldest first.
    pub fn history(&self, id: &ActionId) -> Vec<ActionRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of actions with at least one record.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
