//! Advisor configuration
//!
//! Loaded from TOML. Search order:
//!
//! 1. `--config` flag or `CROP_ADVISOR_CONFIG` environment variable
//! 2. `crop_advisor.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ```toml
//! [data]
//! database = "crop_advisor.db"
//! model = "data/crop_model.json"
//!
//! [defaults]
//! ph = 6.5
//! drainage = "moderate"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::SoilSample;

const LOCAL_CONFIG: &str = "crop_advisor.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// SQLite file holding the fertilizer reference table
    pub database: PathBuf,
    /// Pre-trained classifier artifact
    pub model: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("crop_advisor.db"),
            model: PathBuf::from("data/crop_model.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub data: DataConfig,
    /// Values pre-filled on the soil form
    pub defaults: SoilSample,
}

impl AdvisorConfig {
    /// Load using the standard search order. An explicitly named file
    /// must load; the local file falls back to defaults with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "loaded config");
            return Ok(config);
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!("loaded config from ./{}", LOCAL_CONFIG);
                    return Ok(config);
                }
                Err(e) => warn!(error = %e, "failed to load ./{}, using defaults", LOCAL_CONFIG),
            }
        }

        info!("no config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.data.database.as_os_str().is_empty() {
            problems.push("data.database must not be empty".to_string());
        }
        if self.data.model.as_os_str().is_empty() {
            problems.push("data.model must not be empty".to_string());
        }
        if let Err(e) = self.defaults.validate() {
            problems.push(format!("defaults: {}", e));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }
}
