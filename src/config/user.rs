//! User configuration loading for polylsp.
//!
//! User config location: $XDG_CONFIG_HOME/polylsp/polylsp.toml
//! Fallback: the platform config directory (`dirs::config_dir()`).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::SettingsLayer;

/// File name of both the user and the project configuration.
pub const CONFIG_FILE_NAME: &str = "polylsp.toml";

#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type UserConfigResult<T> = Result<T, UserConfigError>;

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/polylsp/polylsp.toml
/// 2. Otherwise: `<platform config dir>/polylsp/polylsp.toml`
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg_config) if !xdg_config.is_empty() => PathBuf::from(xdg_config),
        _ => dirs::config_dir()?,
    };
    Some(base.join("polylsp").join(CONFIG_FILE_NAME))
}

/// Load the user configuration, `Ok(None)` when there is none.
pub fn load_user_config() -> UserConfigResult<Option<SettingsLayer>> {
    match user_config_path() {
        Some(path) if path.exists() => load_config_file(&path).map(Some),
        _ => Ok(None),
    }
}

/// Parse one TOML settings file.
pub fn load_config_file(path: &Path) -> UserConfigResult<SettingsLayer> {
    let contents = fs::read_to_string(path).map_err(|source| UserConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| UserConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
