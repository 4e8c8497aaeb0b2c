use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use emt_study_lib::config::Config;
use emt_study_lib::AppState;

/// Shared application state for CLI commands
pub struct App {
    pub config: Config,
    pub state: AppState,
}

impl App {
    /// Load config and open the data directory.
    ///
    /// `data_dir` overrides the directory named in the config file.
    pub fn new(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path);
        let mut config = Config::load_from(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?;

        if data_dir.is_some() {
            config.data_dir = data_dir;
        }

        let state = AppState::open(&config).context("Failed to open data directory")?;
        Ok(Self { config, state })
    }
}
