//! Settings loading and logging setup for hosts embedding `converge-core`

pub mod error;
pub mod logging;
pub mod settings;

pub use error::*;
pub use logging::{env_filter, init_tracing};
pub use settings::{RetrySettings, Settings};

use std::path::PathBuf;

/// Environment variable naming the config file directly
pub const CONFIG_PATH_ENV: &str = "CONVERGE_CONFIG_PATH";

/// File names looked up in the current directory, in priority order
const CANDIDATES: [&str; 2] = ["converge.local.yaml", "converge.yaml"];

/// Find the settings file.
///
/// Lookup order:
/// 1. `CONVERGE_CONFIG_PATH` (an error if it names a missing file)
/// 2. Current directory: `converge.local.yaml`, `converge.yaml`
/// 3. `<config dir>/converge/converge.yaml`
///
/// Returns `Ok(None)` when none of these exist.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("converge").join("converge.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}
