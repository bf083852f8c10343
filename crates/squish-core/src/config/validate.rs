//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::types::SourceFormat;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opt = &self.optimization;
        if opt.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "optimization.max_file_size must be > 0".into(),
            ));
        }
        if !opt.target_format.eq_ignore_ascii_case("webp") {
            return Err(ConfigError::ValidationError(format!(
                "optimization.target_format '{}' is not supported (only webp)",
                opt.target_format
            )));
        }
        if opt.source_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "optimization.source_formats must not be empty".into(),
            ));
        }
        if let Some(bad) = opt
            .source_formats
            .iter()
            .find(|ext| SourceFormat::from_extension(ext).is_none())
        {
            return Err(ConfigError::ValidationError(format!(
                "optimization.source_formats contains unsupported format '{bad}'"
            )));
        }
        if opt.quality_ladder.is_empty() {
            return Err(ConfigError::ValidationError(
                "optimization.quality_ladder must not be empty".into(),
            ));
        }
        if opt.quality_ladder.iter().any(|&q| q == 0 || q > 100) {
            return Err(ConfigError::ValidationError(
                "optimization.quality_ladder values must be between 1 and 100".into(),
            ));
        }
        if opt.quality_ladder.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigError::ValidationError(
                "optimization.quality_ladder must be strictly descending".into(),
            ));
        }
        if self.resize.max_width == 0 || self.resize.max_height == 0 {
            return Err(ConfigError::ValidationError(
                "resize.max_width and resize.max_height must be > 0".into(),
            ));
        }
        if self.thumbnail.widths.iter().any(|&w| w == 0) {
            return Err(ConfigError::ValidationError(
                "thumbnail.widths must all be > 0".into(),
            ));
        }
        if self.thumbnail.quality == 0 || self.thumbnail.quality > 100 {
            return Err(ConfigError::ValidationError(
                "thumbnail.quality must be between 1 and 100".into(),
            ));
        }
        if self.processing.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "processing.concurrency must be > 0".into(),
            ));
        }
        if self.codec.method > 6 {
            return Err(ConfigError::ValidationError(
                "codec.method must be between 0 and 6".into(),
            ));
        }
        if self.limits.tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.tool_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
