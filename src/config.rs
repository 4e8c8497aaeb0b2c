//! Configuration persistence

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{
    DurableStore, FileStore, RecoveryPolicy, Repository, StorageError,
    DEFAULT_MAX_UPDATE_ATTEMPTS,
};

/// Average score below which a topic is reported as weak
pub const DEFAULT_WEAK_TOPIC_THRESHOLD: f64 = 70.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings that persist between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where progress and flashcard data live; the platform data dir if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
    #[serde(default = "default_weak_topic_threshold")]
    pub weak_topic_threshold: f64,
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
}

fn default_weak_topic_threshold() -> f64 {
    DEFAULT_WEAK_TOPIC_THRESHOLD
}

fn default_max_update_attempts() -> u32 {
    DEFAULT_MAX_UPDATE_ATTEMPTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            recovery: RecoveryPolicy::default(),
            weak_topic_threshold: default_weak_topic_threshold(),
            max_update_attempts: default_max_update_attempts(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emt-study")
            .join("config.toml")
    }

    /// Load config from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from disk, returning defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.weak_topic_threshold) {
            return Err(ConfigError::Invalid(format!(
                "weakTopicThreshold {} is outside 0-100",
                self.weak_topic_threshold
            )));
        }
        if self.max_update_attempts == 0 {
            return Err(ConfigError::Invalid(
                "maxUpdateAttempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured data directory, or the platform default
    pub fn resolved_data_dir(&self) -> std::result::Result<PathBuf, StorageError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => FileStore::default_data_dir(),
        }
    }

    /// A repository over `store` using this config's policies
    pub fn repository(&self, store: Arc<dyn DurableStore>) -> Repository {
        Repository::new(store)
            .with_policy(self.recovery)
            .with_max_update_attempts(self.max_update_attempts)
    }
}
