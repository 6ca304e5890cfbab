// Configuration loaded from YAML

use crate::timestamp::TimestampPolicy;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "timetrack";
const CONFIG_FILE_NAME: &str = "config.yaml";
pub const CONFIG_ENV_VAR: &str = "TIMETRACK_CONFIG";

/// Validation and normalization policy applied by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Reject creation payloads that omit reference_tickets
    pub require_reference_tickets: bool,
    /// Handling of timestamps that fail to parse
    pub timestamp_policy: TimestampPolicy,
    /// Reject tasks whose end_time precedes their start_time
    pub require_end_after_start: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            require_reference_tickets: true,
            timestamp_policy: TimestampPolicy::Lenient,
            require_end_after_start: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.timetrack` store
    pub store_path: Option<PathBuf>,
    #[serde(flatten)]
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `$TIMETRACK_CONFIG` or the
    /// platform config directory is consulted, and a missing file there means
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!(path = ?path, "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(eyre!("Config file not found: {}", path.display()));
        }

        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

        debug!(path = ?path, ?config, "Loaded config");
        Ok(config)
    }

    /// Root directory of the store
    pub fn store_root(&self) -> PathBuf {
        self.store_path
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME)),
    }
}
