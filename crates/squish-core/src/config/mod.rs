//! Configuration management for squish.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a missing file or a
//! partial file both produce a usable config.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for squish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Byte budget, formats, quality ladder
    pub optimization: OptimizationConfig,

    /// Resize bounds
    pub resize: ResizeConfig,

    /// Thumbnail variants
    pub thumbnail: ThumbnailConfig,

    /// Source/output/backup/temp roots
    pub directories: DirectoriesConfig,

    /// Batch scheduling
    pub processing: ProcessingConfig,

    /// Codec backend and tool names
    pub codec: CodecConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/rs.squish.squish/config.toml
    /// - Linux: ~/.config/squish/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\squish\config\config.toml
    ///
    /// Falls back to ~/.squish/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("rs", "squish", "squish")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".squish").join("config.toml")
            })
    }

    /// Resolved source root (with ~ expansion).
    pub fn source_dir(&self) -> PathBuf {
        expand(&self.directories.source)
    }

    /// Resolved output root (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        expand(&self.directories.output)
    }

    /// Resolved backup root (with ~ expansion).
    pub fn backup_dir(&self) -> PathBuf {
        expand(&self.directories.backup)
    }

    /// Resolved temp root (with ~ expansion).
    pub fn temp_dir(&self) -> PathBuf {
        expand(&self.directories.temp)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
