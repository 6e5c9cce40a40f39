use crate::error::{ConfigError, Result};
use crate::settings::Settings;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` if set, otherwise from the configured `log_filter`
pub fn env_filter(settings: &Settings) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.log_filter).map_err(|e| ConfigError::Invalid {
        key: "log_filter",
        message: e.to_string(),
    })
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &Settings) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings)?)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_configured_filter_used_without_rust_log() {
        temp_env::with_var_unset("RUST_LOG", || {
            let settings = Settings {
                log_filter: "converge_core=debug".to_string(),
                ..Settings::default()
            };
            let filter = env_filter(&settings).unwrap();
            assert_eq!(filter.to_string(), "converge_core=debug");
        });
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            let filter = env_filter(&Settings::default()).unwrap();
            assert_eq!(filter.to_string(), "warn");
        });
    }

    #[test]
    #[serial]
    fn test_bad_filter_rejected() {
        temp_env::with_var_unset("RUST_LOG", || {
            let settings = Settings {
                log_filter: "converge_core=loud".to_string(),
                ..Settings::default()
            };
            match env_filter(&settings) {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "log_filter"),
                other => panic!("expected invalid log_filter, got {other:?}"),
            }
        });
    }
}
