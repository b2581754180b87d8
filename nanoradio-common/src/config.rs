//! Configuration file resolution and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "NANORADIO_CONFIG";

/// Configuration file name looked up in the platform config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve the configuration file path in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config directory (`~/.config/nanoradio/config.toml` on Linux)
/// 4. System-wide config (`/etc/nanoradio/config.toml`, Linux only)
///
/// Explicit paths (1, 2) are returned even when the file does not exist so that
/// the caller reports the mistake; implicit locations are only returned when present.
/// `None` means "no config file, use built-in defaults".
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("nanoradio").join(CONFIG_FILE_NAME)) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System-wide config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/nanoradio").join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML configuration file into `T`.
///
/// A missing path (`None`) is not an error: built-in defaults are returned.
/// A path that cannot be read or parsed is a configuration error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    if content.trim().is_empty() {
        warn!("Configuration file {} is empty, using built-in defaults", path.display());
        return Ok(T::default());
    }

    let config = toml::from_str::<T>(&content).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
