//! Owner of the application state and the session map.
//!
//! Values stored here are immutable; updates swap the stored instance for
//! the one returned by the caller's updater. Concurrent updates to the same
//! session id are not serialized against each other; callers coordinate
//! their own writes.

use super::application::ApplicationState;
use super::session::{SessionOptions, SessionState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Bump when the snapshot shape changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time view of everything the manager tracks. Cheap to take since
/// the tracked values are immutable.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub application_state: ApplicationState,
    pub sessions: Vec<SessionState>,
}

struct ManagerInner {
    application: ApplicationState,
    sessions: HashMap<String, SessionState>,
}

/// Holds one `ApplicationState` and all tracked sessions.
pub struct StateManager {
    inner: Mutex<ManagerInner>,
    session_options: SessionOptions,
}

fn lock(inner: &Mutex<ManagerInner>) -> std::sync::MutexGuard<'_, ManagerInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateManager {
    pub fn new(application: ApplicationState) -> Self {
        Self {
            inner: Mutex::new(ManagerInner {
                application,
                sessions: HashMap::new(),
            }),
            session_options: SessionOptions::default(),
        }
    }

    /// Default options applied to sessions created by this manager.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Creates, stores and returns a fresh session. An existing session
    /// under the same id is replaced.
    pub fn create_session(&self, session_id: &str, user_id: Option<&str>) -> SessionState {
        let session =
            SessionState::new(session_id, user_id).with_options(self.session_options.clone());
        let mut inner = lock(&self.inner);
        inner
            .sessions
            .insert(session_id.to_string(), session.clone());
        tracing::debug!("session '{}' created", session_id);
        session
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionState> {
        let inner = lock(&self.inner);
        inner.sessions.get(session_id).cloned()
    }

    /// Replaces the stored session with the updater's result. Existence is
    /// not validated here; callers that require the session to exist check
    /// the returned `Option`.
    pub fn update_session(
        &self,
        session_id: &str,
        updater: impl FnOnce(&SessionState) -> SessionState,
    ) -> Option<SessionState> {
        let mut inner = lock(&self.inner);
        let current = inner.sessions.get(session_id)?;
        let next = updater(current);
        inner
            .sessions
            .insert(session_id.to_string(), next.clone());
        Some(next)
    }

    /// All tracked sessions, active or not. The name is historical;
    /// filtering by activity is the caller's job.
    pub fn list_active_sessions(&self) -> Vec<SessionState> {
        let inner = lock(&self.inner);
        inner.sessions.values().cloned().collect()
    }

    pub fn remove_session(&self, session_id: &str) -> Option<SessionState> {
        let mut inner = lock(&self.inner);
        inner.sessions.remove(session_id)
    }

    /// Bulk-evicts sessions whose inactivity timeout has elapsed. Returns
    /// the number of sessions removed.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let mut inner = lock(&self.inner);
        let before = inner.sessions.len();
        inner.sessions.retain(|_, session| !session.is_expired());
        let removed = before - inner.sessions.len();
        if removed > 0 {
            tracing::debug!("evicted {} expired session(s)", removed);
        }
        removed
    }

    pub fn application_state(&self) -> ApplicationState {
        let inner = lock(&self.inner);
        inner.application.clone()
    }

    /// Replaces the application state with the updater's result.
    pub fn update_application_state(
        &self,
        updater: impl FnOnce(&ApplicationState) -> ApplicationState,
    ) -> ApplicationState {
        let mut inner = lock(&self.inner);
        let next = updater(&inner.application);
        inner.application = next.clone();
        next
    }

    pub fn create_snapshot(&self) -> StateSnapshot {
        let inner = lock(&self.inner);
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            application_state: inner.application.clone(),
            sessions: inner.sessions.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
