pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{ClassifierOverrides, PollSettings, RetrySettings, Settings, TimeoutSettings};

use std::path::PathBuf;

const CONFIG_FILE_NAMES: [&str; 2] = ["stratus.local.yaml", "stratus.yaml"];

/// Stratus' global config directory (~/.config/stratus)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stratus");
    Ok(config_dir)
}

/// Find the settings file
///
/// Search order:
/// 1. STRATUS_CONFIG_PATH (direct path)
/// 2. current directory: stratus.local.yaml, stratus.yaml
/// 3. ./.stratus/stratus.yaml
/// 4. ~/.config/stratus/stratus.yaml (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("STRATUS_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "STRATUS_CONFIG_PATH does not exist, ignoring it");
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CONFIG_FILE_NAMES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project = current_dir.join(".stratus").join("stratus.yaml");
    if project.exists() {
        return Ok(project);
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("stratus.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load settings from the discovered file, or defaults when there is none
pub fn load() -> Result<Settings> {
    match find_config_file() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loading settings");
            Settings::from_file(&path)
        }
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("no settings file found, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}
