use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_EVENT_BUFFER: usize = 256;
pub const DEFAULT_MAX_DISPLAY_ROWS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on concurrently running tasks.
    pub processor_count: usize,
    /// Capacity of the executor event channel.
    pub event_buffer: usize,
    /// Rows shown by the aggregator before truncating.
    pub max_display_rows: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processor_count: default_processor_count(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_display_rows: DEFAULT_MAX_DISPLAY_ROWS,
            debug: false,
        }
    }
}

fn default_processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    pub fn qpar_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".qpar"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::qpar_dir()?.join("qpar.toml"))
    }

    /// Load `~/.qpar/qpar.toml`, or defaults if it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            processor_count = config.processor_count,
            event_buffer = config.event_buffer,
            max_display_rows = config.max_display_rows,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.processor_count == 0 {
            return Err(Error::InvalidConfig(
                "processor_count must be at least 1".to_string(),
            ));
        }
        if self.max_display_rows == 0 {
            return Err(Error::InvalidConfig(
                "max_display_rows must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
