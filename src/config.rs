// Store configuration

use eyre::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SNAPSHOT_FILE: &str = "kanban_backup.json";
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(60);

/// Settings consumed by the store and persister
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Snapshot file location
    pub snapshot_path: PathBuf,
    /// How often the persister flushes dirty state
    pub persist_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            persist_interval: DEFAULT_PERSIST_INTERVAL,
        }
    }
}

// On-disk shape; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    snapshot_path: Option<PathBuf>,
    persist_interval_secs: Option<u64>,
}

impl Config {
    pub fn with_snapshot_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            snapshot_path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load settings from a YAML file, keeping defaults for missing keys
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not a map
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let mut config = Self::default();
        if let Some(snapshot_path) = file.snapshot_path {
            config.snapshot_path = snapshot_path;
        }
        if let Some(secs) = file.persist_interval_secs {
            if secs == 0 {
                eyre::bail!("persist_interval_secs must be greater than zero");
            }
            config.persist_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
