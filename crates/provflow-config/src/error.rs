use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found")]
    ConfigDirNotFound,

    #[error(
        "configuration file not found. Looked for:\n\
        - current directory: provflow.yaml, provflow.yml\n\
        - ./.provflow/ directory\n\
        - ~/.config/provflow/provflow.yaml\n\
        A path can also be given with --config or the PROVFLOW_CONFIG environment variable"
    )]
    ConfigFileNotFound,

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
