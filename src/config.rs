//! Engine configuration.
//!
//! All fields have serde defaults so partial config files keep working as
//! knobs are added.

use crate::state::session::SessionOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Retry backoff for steps that opt into retries.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Retention policy for finished workflow state. The engine never
    /// prunes implicitly; hosts wire this to a periodic
    /// `prune_finished` call.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Defaults applied to sessions created by the state manager.
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Base delay for linear backoff; attempt N waits N times this.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Whether hosts should prune finished workflow state at all.
    #[serde(default)]
    pub enabled: bool,
    /// Minimum age of a Completed/Failed entry before eviction.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_age_secs() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_secs: default_max_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Inactivity timeout in milliseconds; `0` disables expiry.
    #[serde(default = "default_session_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_history_size() -> usize {
    crate::state::session::DEFAULT_MAX_HISTORY
}

fn default_session_timeout_ms() -> u64 {
    crate::state::session::DEFAULT_TIMEOUT_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_size: default_max_history_size(),
            timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_history_size: config.max_history_size,
            timeout_ms: config.timeout_ms,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(!config.retention.enabled);
        assert_eq!(config.retention.max_age_secs, 3600);
        assert_eq!(config.session.max_history_size, 1000);
        assert_eq!(config.session.timeout_ms, 30 * 60 * 1000);
    }

    #[test]
    fn partial_yaml_fills_missing_fields() {
        let config: EngineConfig = serde_yaml::from_str("retry:\n  base_delay_ms: 50\n").unwrap();
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.session.max_history_size, 1000);
    }

    #[test]
    fn session_config_converts_to_options() {
        let config = SessionConfig {
            max_history_size: 5,
            timeout_ms: 0,
        };
        let options = SessionOptions::from(&config);
        assert_eq!(options.max_history_size, 5);
        assert_eq!(options.timeout_ms, 0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load(Path::new("/no/such/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
