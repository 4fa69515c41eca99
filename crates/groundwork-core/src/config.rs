//! Engine configuration loading

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

/// File names probed when discovering configuration
const CONFIG_FILE_NAMES: &[&str] = &["groundwork.toml", "groundwork.yaml", "groundwork.yml"];

/// Tunables for a convergence pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum tasks rendered concurrently
    pub max_parallel: usize,
    /// Attempt budget for transient (try-again-later) errors
    pub max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt
    pub backoff_base_ms: u64,
    /// Retry delay ceiling in milliseconds
    pub backoff_max_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: EngineConfig = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.max_parallel == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_parallel".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }
    if config.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }
    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::InvalidValue {
            field: "backoff_base_ms".to_string(),
            message: "must not exceed backoff_max_ms".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Find a configuration file in the directory or its parents.
///
/// The first matching name wins; parents are walked to the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in CONFIG_FILE_NAMES {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from a directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(EngineConfig, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or fall back to defaults
pub fn load_config_or_default(dir: &Path) -> (EngineConfig, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(_) => {
            warn!(dir = %dir.display(), "no config found, using defaults");
            (EngineConfig::default(), None)
        }
    }
}
