//! Tests for the copy-on-write session state.

use super::*;
use chrono::Duration;
use proptest::prelude::*;
use serde_json::json;

fn record(id: &str) -> OperationRecord {
    OperationRecord {
        id: id.to_string(),
        kind: "rename".to_string(),
        timestamp: Utc::now(),
        description: format!("operation {}", id),
        metadata: HashMap::new(),
    }
}

#[test]
fn mutators_leave_the_original_untouched() {
    let original = SessionState::new("s1", Some("alice"));
    let mut partial = HashMap::new();
    partial.insert("project".to_string(), json!("codescope"));

    let updated = original.update_context(partial);

    assert!(original.context.is_empty());
    assert_eq!(updated.context.get("project"), Some(&json!("codescope")));
    assert!(updated.last_accessed_at >= original.last_accessed_at);
}

#[test]
fn update_context_shallow_merges_keys() {
    let state = SessionState::new("s1", None);
    let mut first = HashMap::new();
    first.insert("a".to_string(), json!(1));
    first.insert("b".to_string(), json!(2));
    let mut second = HashMap::new();
    second.insert("b".to_string(), json!(20));

    let merged = state.update_context(first).update_context(second);

    assert_eq!(merged.context.get("a"), Some(&json!(1)));
    assert_eq!(merged.context.get("b"), Some(&json!(20)));
}

#[test]
fn activate_and_deactivate_toggle_the_flag() {
    let state = SessionState::new("s1", None).deactivate();
    assert!(!state.is_active);
    assert!(state.activate().is_active);
}

#[test]
fn history_is_bounded_with_fifo_eviction() {
    let state = SessionState::new("s1", None).with_options(SessionOptions {
        max_history_size: 3,
        timeout_ms: 0,
    });

    let state = state.add_operations(vec![
        record("op1"),
        record("op2"),
        record("op3"),
        record("op4"),
    ]);

    assert_eq!(state.operation_history.len(), 3);
    let ids: Vec<&str> = state
        .operation_history
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["op2", "op3", "op4"]);
}

proptest! {
    #[test]
    fn history_never_exceeds_bound(count in 0usize..50, bound in 1usize..10) {
        let mut state = SessionState::new("s1", None).with_options(SessionOptions {
            max_history_size: bound,
            timeout_ms: 0,
        });
        for i in 0..count {
            state = state.add_operation(record(&format!("op{}", i)));
        }
        prop_assert!(state.operation_history.len() <= bound);
    }
}

#[test]
fn revert_to_operation_truncates_inclusively() {
    let state = SessionState::new("s1", None).add_operations(vec![
        record("op1"),
        record("op2"),
        record("op3"),
    ]);

    let reverted = state.revert_to_operation("op2");
    let ids: Vec<&str> = reverted
        .operation_history
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["op1", "op2"]);
}

#[test]
fn revert_to_absent_operation_is_a_noop() {
    let state = SessionState::new("s1", None).add_operations(vec![record("op1"), record("op2")]);
    let reverted = state.revert_to_operation("no-such-op");
    assert_eq!(reverted.operation_history.len(), 2);
}

#[test]
fn clear_history_empties_the_log() {
    let state = SessionState::new("s1", None).add_operation(record("op1"));
    assert!(state.clear_history().operation_history.is_empty());
}

#[test]
fn snapshot_at_filters_only_the_history() {
    let mut early = record("early");
    early.timestamp = Utc::now() - Duration::minutes(10);
    let late = record("late");

    let state = SessionState::new("s1", None)
        .add_operations(vec![early, late])
        .update_context({
            let mut ctx = HashMap::new();
            ctx.insert("live".to_string(), json!(true));
            ctx
        });

    let snapshot = state.snapshot_at(Utc::now() - Duration::minutes(5));

    assert_eq!(snapshot.operation_history.len(), 1);
    assert_eq!(snapshot.operation_history[0].id, "early");
    // non-history fields reflect the current state
    assert_eq!(snapshot.context.get("live"), Some(&json!(true)));
}

#[test]
fn zero_timeout_never_expires() {
    let mut state = SessionState::new("s1", None).with_options(SessionOptions {
        max_history_size: 10,
        timeout_ms: 0,
    });
    state.last_accessed_at = Utc::now() - Duration::days(365);
    assert!(!state.is_expired());
}

#[test]
fn stale_session_expires_past_timeout() {
    let mut state = SessionState::new("s1", None).with_options(SessionOptions {
        max_history_size: 10,
        timeout_ms: 1000,
    });
    state.last_accessed_at = Utc::now() - Duration::seconds(2);
    assert!(state.is_expired());

    let fresh = state.activate();
    assert!(!fresh.is_expired());
}

#[test]
fn json_round_trip_is_lossless() {
    let state = SessionState::new("s1", Some("alice"))
        .add_operation(record("op1").with_metadata("file", "src/lib.rs"))
        .update_context({
            let mut ctx = HashMap::new();
            ctx.insert("root".to_string(), json!("/work"));
            ctx
        });

    let restored = SessionState::from_json(state.to_json().unwrap()).unwrap();

    assert_eq!(restored.session_id, state.session_id);
    assert_eq!(restored.user_id, state.user_id);
    assert_eq!(restored.operation_history, state.operation_history);
    assert_eq!(restored.context, state.context);
    assert_eq!(restored.created_at, state.created_at);
}

#[test]
fn from_json_fills_missing_fields_with_defaults() {
    let restored = SessionState::from_json(json!({"session_id": "bare"})).unwrap();
    assert_eq!(restored.session_id, "bare");
    assert!(restored.is_active);
    assert!(restored.user_id.is_none());
    assert!(restored.operation_history.is_empty());
    assert_eq!(restored.options.max_history_size, DEFAULT_MAX_HISTORY);
    assert_eq!(restored.options.timeout_ms, DEFAULT_TIMEOUT_MS);
}

#[test]
fn duration_grows_from_creation() {
    let mut state = SessionState::new("s1", None);
    state.created_at = Utc::now() - Duration::seconds(30);
    assert!(state.duration().num_seconds() >= 30);
}
