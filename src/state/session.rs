//! Immutable per-session state.
//!
//! `SessionState` is a copy-on-write value object: every mutator consumes
//! nothing and returns a fresh instance, so snapshots taken at any point
//! stay valid forever. The operation history doubles as a time-travel log
//! for `revert_to_operation`/`snapshot_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default bound on `operation_history` length.
pub const DEFAULT_MAX_HISTORY: usize = 1000;
/// Default inactivity timeout: 30 minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Per-session tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(default = "default_max_history")]
    pub max_history_size: usize,
    /// Inactivity timeout in milliseconds. `0` means the session never
    /// expires.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// One recorded operation (rename, move, index run, ...) in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl OperationRecord {
    /// Builds a record with a generated id, stamped with the current time.
    pub fn new(kind: &str, description: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            timestamp: Utc::now(),
            description: description.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Immutable state of one user session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub operation_history: Vec<OperationRecord>,
    #[serde(default)]
    pub options: SessionOptions,
}

fn default_active() -> bool {
    true
}

impl SessionState {
    pub fn new(session_id: &str, user_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
            is_active: true,
            created_at: now,
            last_accessed_at: now,
            context: HashMap::new(),
            operation_history: Vec::new(),
            options: SessionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Shallow-merges `partial` into the context and refreshes the access
    /// time. Existing keys not named in `partial` are kept.
    pub fn update_context(&self, partial: HashMap<String, Value>) -> Self {
        let mut next = self.clone();
        next.context.extend(partial);
        next.last_accessed_at = Utc::now();
        next
    }

    pub fn activate(&self) -> Self {
        let mut next = self.clone();
        next.is_active = true;
        next.last_accessed_at = Utc::now();
        next
    }

    pub fn deactivate(&self) -> Self {
        let mut next = self.clone();
        next.is_active = false;
        next.last_accessed_at = Utc::now();
        next
    }

    /// Appends a record, evicting the oldest entries (FIFO) whenever the
    /// history would exceed `max_history_size`.
    pub fn add_operation(&self, record: OperationRecord) -> Self {
        let mut next = self.clone();
        next.operation_history.push(record);
        let bound = next.options.max_history_size;
        if bound > 0 && next.operation_history.len() > bound {
            let excess = next.operation_history.len() - bound;
            next.operation_history.drain(..excess);
        }
        next.last_accessed_at = Utc::now();
        next
    }

    pub fn add_operations(&self, records: Vec<OperationRecord>) -> Self {
        records
            .into_iter()
            .fold(self.clone(), |state, record| state.add_operation(record))
    }

    pub fn clear_history(&self) -> Self {
        let mut next = self.clone();
        next.operation_history.clear();
        next
    }

    /// True when the session has been inactive longer than the configured
    /// timeout. Sessions with a zero timeout never expire.
    pub fn is_expired(&self) -> bool {
        if self.options.timeout_ms == 0 {
            return false;
        }
        let idle = Utc::now() - self.last_accessed_at;
        idle.num_milliseconds() > self.options.timeout_ms as i64
    }

    /// Time since the session was created.
    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Truncates the history so it ends at (and includes) the record with
    /// `operation_id`. No-op when the id is absent.
    pub fn revert_to_operation(&self, operation_id: &str) -> Self {
        match self
            .operation_history
            .iter()
            .position(|record| record.id == operation_id)
        {
            Some(pos) => {
                let mut next = self.clone();
                next.operation_history.truncate(pos + 1);
                next
            }
            None => self.clone(),
        }
    }

    /// View of the session with the history filtered to records at or
    /// before `timestamp`. Only the history is filtered; every other field
    /// reflects the current state, not a historical restore.
    pub fn snapshot_at(&self, timestamp: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.operation_history
            .retain(|record| record.timestamp <= timestamp);
        next
    }

    /// Lossless JSON serialization.
    pub fn to_json(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserializes a session; missing fields fall back to the constructor
    /// defaults.
    pub fn from_json(value: Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
