//! Configuration loading and saving.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::AppConfig;

/// Configuration directory name under the per-user config dir.
pub const USER_CONFIG_DIR: &str = "proxydown";

/// Configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Loads and saves the persisted configuration file.
///
/// The loader owns the on-disk location; everything else passes
/// [`AppConfig`] values around.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader pointing at the default per-user config path.
    #[must_use]
    pub fn new() -> Self {
        let dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            path: dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a loader with an explicit path (`--config` flag, tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a resource file next to the configuration file.
    ///
    /// Used for session artifacts shipped alongside the config, such as the
    /// interception trust certificate.
    #[must_use]
    pub fn resource_path(&self, name: &str) -> PathBuf {
        match self.path.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Load the configuration, falling back to defaults when the file does
    /// not exist yet.
    ///
    /// Invalid TOML is an error (fail fast with a clear message) rather than
    /// silently reverting the user's settings to defaults.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.path.exists() {
            debug!("No config file at {:?}, using defaults", self.path);
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::ReadError {
            path: self.path.clone(),
            source: e,
        })?;

        let config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("Loaded config from {:?}", self.path);
        Ok(config)
    }

    /// Save the configuration, creating the parent directory if needed.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: self.path.clone(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.path, content).map_err(|e| ConfigError::WriteError {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("Saved config to {:?}", self.path);
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
