use std::path::{Path, PathBuf};

use anyhow::Result;
use lettergate_common::AppConfig;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/lettergate.yaml";

/// Resolved configuration with the path it came from.
pub struct ServerConfig {
    pub config: AppConfig,
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load `path`. A missing file at the default location falls back to
    /// built-in defaults; a missing explicit path is an error.
    pub fn load(path: &str) -> Result<Self> {
        let config = if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
            warn!(path, "configuration file not found, using defaults");
            let config = AppConfig::default();
            config.validate()?;
            config
        } else {
            info!(path, "loading configuration");
            AppConfig::load(path)?
        };

        Ok(Self {
            config,
            config_path: PathBuf::from(path),
        })
    }
}
