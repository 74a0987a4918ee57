//! Immutable application-wide state.
//!
//! Same copy-on-write discipline as `SessionState`: mutators return a new
//! instance. Owned by the `StateManager`, which replaces (never mutates) the
//! stored value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Health of one toolkit module (indexer, search, rename, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Uninitialized,
    Ready,
    Degraded,
    Failed,
}

/// Last known state of a registered module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub status: ModuleStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub detail: HashMap<String, Value>,
}

impl ModuleState {
    pub fn new(status: ModuleStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            detail: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub start_time: DateTime<Utc>,
    pub total_operations: u64,
    pub average_response_time_ms: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            total_operations: 0,
            average_response_time_ms: 0.0,
        }
    }
}

/// Compact read-only view for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub version: String,
    pub environment: String,
    pub is_initialized: bool,
    pub module_count: usize,
    pub cache_hit_rate: f64,
    pub total_operations: u64,
    pub runtime_secs: i64,
}

/// Immutable application-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationState {
    pub version: String,
    pub environment: String,
    #[serde(default)]
    pub is_initialized: bool,
    #[serde(default)]
    pub module_states: HashMap<String, ModuleState>,
    #[serde(default)]
    pub global_settings: HashMap<String, Value>,
    #[serde(default)]
    pub cache_stats: CacheStats,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

impl ApplicationState {
    pub fn new(version: &str, environment: &str) -> Self {
        Self {
            version: version.to_string(),
            environment: environment.to_string(),
            is_initialized: false,
            module_states: HashMap::new(),
            global_settings: HashMap::new(),
            cache_stats: CacheStats::default(),
            performance_metrics: PerformanceMetrics::default(),
        }
    }

    pub fn initialized(&self) -> Self {
        let mut next = self.clone();
        next.is_initialized = true;
        next
    }

    // ---- module states ----

    pub fn set_module_state(&self, module_id: &str, state: ModuleState) -> Self {
        let mut next = self.clone();
        next.module_states.insert(module_id.to_string(), state);
        next
    }

    pub fn set_module_states(&self, states: HashMap<String, ModuleState>) -> Self {
        let mut next = self.clone();
        next.module_states.extend(states);
        next
    }

    pub fn get_module_state(&self, module_id: &str) -> Option<&ModuleState> {
        self.module_states.get(module_id)
    }

    pub fn remove_module_state(&self, module_id: &str) -> Self {
        let mut next = self.clone();
        next.module_states.remove(module_id);
        next
    }

    pub fn reset_module_states(&self) -> Self {
        let mut next = self.clone();
        next.module_states.clear();
        next
    }

    // ---- global settings ----

    /// Shallow-merges `partial` into the settings map.
    pub fn update_settings(&self, partial: HashMap<String, Value>) -> Self {
        let mut next = self.clone();
        next.global_settings.extend(partial);
        next
    }

    pub fn get_setting(&self, key: &str) -> Option<&Value> {
        self.global_settings.get(key)
    }

    pub fn remove_setting(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.global_settings.remove(key);
        next
    }

    // ---- cache and performance counters ----

    pub fn increment_cache_hit(&self) -> Self {
        let mut next = self.clone();
        next.cache_stats.hit_count += 1;
        next
    }

    pub fn increment_cache_miss(&self) -> Self {
        let mut next = self.clone();
        next.cache_stats.miss_count += 1;
        next
    }

    /// Hit ratio in `[0, 1]`; `0` before any sample was recorded.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_stats.hit_count + self.cache_stats.miss_count;
        if total == 0 {
            return 0.0;
        }
        self.cache_stats.hit_count as f64 / total as f64
    }

    /// Folds one response time into the running mean and bumps the
    /// operation counter.
    pub fn record_operation(&self, response_time_ms: f64) -> Self {
        let mut next = self.clone();
        let n = next.performance_metrics.total_operations as f64;
        let old_avg = next.performance_metrics.average_response_time_ms;
        next.performance_metrics.average_response_time_ms =
            (old_avg * n + response_time_ms) / (n + 1.0);
        next.performance_metrics.total_operations += 1;
        next
    }

    /// Time since the process-level metrics started.
    pub fn runtime(&self) -> chrono::Duration {
        Utc::now() - self.performance_metrics.start_time
    }

    /// Structural sanity check, invoked on demand (never automatically on
    /// mutation).
    pub fn is_valid(&self) -> bool {
        !self.version.trim().is_empty()
            && !self.environment.trim().is_empty()
            && self.performance_metrics.average_response_time_ms >= 0.0
            && self.performance_metrics.average_response_time_ms.is_finite()
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            version: self.version.clone(),
            environment: self.environment.clone(),
            is_initialized: self.is_initialized,
            module_count: self.module_states.len(),
            cache_hit_rate: self.cache_hit_rate(),
            total_operations: self.performance_metrics.total_operations,
            runtime_secs: self.runtime().num_seconds(),
        }
    }

    /// Fresh state keeping only version and environment.
    pub fn reset(&self) -> Self {
        Self::new(&self.version, &self.environment)
    }
}

#[cfg(test)]
#[path = "tests/application_tests.rs"]
mod tests;
