use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - STRATUS_CONFIG_PATH\n\
        - current directory: stratus.local.yaml, stratus.yaml\n\
        - ./.stratus/stratus.yaml\n\
        - ~/.config/stratus/stratus.yaml"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<stratus_cloud::CloudError> for ConfigError {
    fn from(err: stratus_cloud::CloudError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
