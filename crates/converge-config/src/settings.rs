//! Reconciler settings
//!
//! ```yaml
//! retry:
//!   max_attempts: 5
//!   initial_delay_ms: 200
//!   max_delay_ms: 10000
//!   backoff_multiplier: 2.0
//!   jitter: 0.2
//! reorder_strategy: swap   # or shift
//! log_filter: info
//! ```
//!
//! Every key is optional.

use crate::error::{ConfigError, Result};
use converge_core::{ReorderStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub retry: RetrySettings,
    pub reorder_strategy: ReorderStrategy,
    /// `tracing` filter directive, used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            reorder_strategy: ReorderStrategy::default(),
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
            jitter: defaults.jitter,
        }
    }
}

impl Settings {
    /// Load from the first config file found (see [`crate::find_config_file`]),
    /// or fall back to defaults when there is none
    pub fn load() -> Result<Self> {
        match crate::find_config_file()? {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No converge config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loading converge settings from {}", path.display());

        // An empty document is valid and means "all defaults"
        let settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "retry.backoff_multiplier",
                message: format!("must be a number >= 1.0, got {}", retry.backoff_multiplier),
            });
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::Invalid {
                key: "retry.jitter",
                message: format!("must be between 0 and 1, got {}", retry.jitter),
            });
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::Invalid {
                key: "retry.initial_delay_ms",
                message: format!(
                    "{} is larger than retry.max_delay_ms ({})",
                    retry.initial_delay_ms, retry.max_delay_ms
                ),
            });
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            jitter: self.retry.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge.yaml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults_match_core() {
        assert_eq!(Settings::default().retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_full_file() {
        let (_dir, path) = write(
            r#"
retry:
  max_attempts: 5
  initial_delay_ms: 200
  max_delay_ms: 10000
  backoff_multiplier: 1.5
  jitter: 0.1
reorder_strategy: shift
log_filter: converge_core=debug
"#,
        );

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.reorder_strategy, ReorderStrategy::Shift);
        assert_eq!(settings.log_filter, "converge_core=debug");

        let retry = settings.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(200));
        assert_eq!(retry.max_delay, Duration::from_secs(10));
        assert_eq!(retry.backoff_multiplier, 1.5);
        assert_eq!(retry.jitter, 0.1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let (_dir, path) = write("retry:\n  max_attempts: 7\n");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.retry.max_attempts, 7);
        assert_eq!(settings.retry.initial_delay_ms, 1000);
        assert_eq!(settings.reorder_strategy, ReorderStrategy::Swap);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let (_dir, path) = write("\n");
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let (_dir, path) = write("retry:\n  max_attempts: 0\n");
        match Settings::load_from(&path) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "retry.max_attempts"),
            other => panic!("expected invalid max_attempts, got {other:?}"),
        }
    }

    #[test]
    fn test_shrinking_multiplier_rejected() {
        let (_dir, path) = write("retry:\n  backoff_multiplier: 0.5\n");
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("retry.backoff_multiplier"));
    }

    #[test]
    fn test_jitter_out_of_range_rejected() {
        let (_dir, path) = write("retry:\n  jitter: 1.5\n");
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("retry.jitter"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let (_dir, path) = write("retries:\n  max_attempts: 2\n");
        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("converge.yaml"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let (_dir, path) = write("reorder_strategy: rotate\n");
        assert!(matches!(
            Settings::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
