//! Structured JSONL audit log for event reconstruction.
//!
//! Machine-parseable append-only log with monotonic sequence numbers and
//! ISO 8601 timestamps with microsecond precision. Attach it to the event
//! bus to capture every workflow lifecycle notification, or call
//! [`AuditLog::record`] directly from other components.

use crate::event_bus::{EventBus, Subscription};
use crate::workflow::WORKFLOW_EVENT;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A single log entry in JSONL format.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number, unique for this log instance.
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds.
    pub ts: String,
    /// Engine instance this entry belongs to.
    pub engine_id: String,
    /// Component that emitted the entry.
    pub component: String,
    /// Structured event data.
    pub event: Value,
}

/// Append-only JSONL audit logger.
pub struct AuditLog {
    engine_id: String,
    seq: AtomicU64,
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log writing to `<dir>/audit.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the log file
    /// cannot be opened.
    pub fn new(engine_id: &str, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("audit.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            engine_id: engine_id.to_string(),
            seq: AtomicU64::new(0),
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Appends one structured entry. Serialization or I/O problems are
    /// logged and swallowed; auditing must never fail the workflow.
    pub fn record(&self, component: &str, event: impl Serialize) {
        let entry = AuditEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            engine_id: self.engine_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("failed to serialize audit entry: {}", err);
                return;
            }
        };
        if let Ok(mut file) = self.file.lock() {
            if let Err(err) = writeln!(file, "{}", line) {
                tracing::warn!("failed to write audit entry: {}", err);
            }
        }
    }

    /// Subscribes this log to all workflow lifecycle events on `bus`.
    ///
    /// # Errors
    ///
    /// Propagates the bus's subscription validation error.
    pub fn attach(self: Arc<Self>, bus: &EventBus) -> Result<Subscription> {
        let subscription = bus.subscribe_sync(WORKFLOW_EVENT, move |event| {
            self.record("workflow-engine", event.payload);
        })?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{DispatchMode, Event};
    use serde_json::json;
    use tempfile::TempDir;

    fn read_entries(path: &Path) -> Vec<AuditEntry> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn record_appends_jsonl_with_monotonic_seq() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new("engine-1", dir.path()).unwrap();
        log.record("workflow-engine", json!({"event": "started"}));
        log.record("state-manager", json!({"event": "session-created"}));

        let entries = read_entries(log.path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);
        assert_eq!(entries[0].engine_id, "engine-1");
        assert_eq!(entries[1].component, "state-manager");
        assert_eq!(entries[0].event, json!({"event": "started"}));
    }

    #[tokio::test]
    async fn attached_log_captures_workflow_events() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(AuditLog::new("engine-1", dir.path()).unwrap());
        let bus = EventBus::new();
        log.clone().attach(&bus).unwrap();

        bus.emit(
            Event::new(WORKFLOW_EVENT, json!({"workflow_id": "wf1"})),
            DispatchMode::Wait,
        )
        .await;

        let entries = read_entries(log.path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, json!({"workflow_id": "wf1"}));
    }
}
