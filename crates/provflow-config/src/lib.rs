pub mod error;
pub mod snapshot;

pub use error::*;
pub use snapshot::Config;

use std::path::{Path, PathBuf};

/// Environment variable naming a configuration file directly
pub const CONFIG_ENV: &str = "PROVFLOW_CONFIG";

const CANDIDATES: [&str; 2] = ["provflow.yaml", "provflow.yml"];

/// provflow's global configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("provflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the configuration file
///
/// Search order:
/// 1. `explicit` (the `--config` flag)
/// 2. environment variable `PROVFLOW_CONFIG`
/// 3. current directory: provflow.yaml, provflow.yml
/// 4. `./.provflow/` with the same names
/// 5. `~/.config/provflow/provflow.yaml`
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "Configured path does not exist");
        return Err(ConfigError::ConfigFileNotFound);
    }

    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_config_file_in(&current_dir) {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("provflow").join("provflow.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Project-local lookup: `dir` first, then `dir/.provflow/`
pub fn find_config_file_in(dir: &Path) -> Option<PathBuf> {
    let local_dir = dir.join(".provflow");

    [dir.to_path_buf(), local_dir]
        .iter()
        .filter(|base| base.is_dir())
        .flat_map(|base| CANDIDATES.iter().map(move |name| base.join(name)))
        .find(|path| path.exists())
}

/// Find and load the configuration in one step
pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = find_config_file(explicit)?;
    let config = Config::load(&path)?;
    Ok((path, config))
}
