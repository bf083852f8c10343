//! Sub-configuration structs with defaults matching the shipped budget.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Byte budget, formats, and the quality search ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Hard cap on every optimized artifact, in bytes
    pub max_file_size: u64,

    /// Source extensions picked up by discovery (case-insensitive)
    pub source_formats: Vec<String>,

    /// Output codec. Only "webp" is supported.
    pub target_format: String,

    /// Descending quality levels tried in order until one fits the cap
    pub quality_ladder: Vec<u8>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_file_size: 200 * 1024,
            source_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "tiff".to_string(),
            ],
            target_format: "webp".to_string(),
            quality_ladder: vec![90, 80, 70, 60, 50, 40, 30],
        }
    }
}

/// Bounding box for the fit-within resize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    /// Maximum output width in pixels
    pub max_width: u32,

    /// Maximum output height in pixels
    pub max_height: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Responsive thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Target widths; height follows the aspect ratio
    pub widths: Vec<u32>,

    /// Encoder quality for every variant
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            widths: vec![150, 300, 600, 1200],
            quality: 80,
        }
    }
}

/// Where the pipeline reads from and writes to.
///
/// Paths may start with `~`; use the resolving accessors on
/// [`Config`](super::Config) rather than reading these directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoriesConfig {
    /// Root of the source tree
    pub source: PathBuf,

    /// Root of optimized output (may live inside `source`)
    pub output: PathBuf,

    /// Mirror of originals written with `--backup`
    pub backup: PathBuf,

    /// Scratch space for resized intermediates
    pub temp: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("./public/images"),
            output: PathBuf::from("./public/images/optimized"),
            backup: PathBuf::from("./public/images/backup"),
            temp: PathBuf::from("./temp/image-processing"),
        }
    }
}

/// Batch scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Images in flight per batch
    pub concurrency: usize,

    /// Skip files whose content hash was already seen in this run
    pub check_duplicates: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            check_duplicates: true,
        }
    }
}

/// Which implementation drives encode, probe, and resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `cwebp` + ImageMagick `identify`/`convert` subprocesses
    #[default]
    External,
    /// In-process libwebp and the `image` crate
    Native,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::External => write!(f, "external"),
            Backend::Native => write!(f, "native"),
        }
    }
}

/// Codec and external tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Implementation to use
    pub backend: Backend,

    /// cwebp compression method, 0 (fast) to 6 (smallest)
    pub method: u8,

    /// cwebp binary name or path
    pub cwebp: String,

    /// ImageMagick identify binary name or path
    pub identify: String,

    /// ImageMagick convert binary name or path
    pub convert: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            backend: Backend::External,
            method: 6,
            cwebp: "cwebp".to_string(),
            identify: "identify".to_string(),
            convert: "convert".to_string(),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Timeout for a single tool invocation or blocking codec call
    pub tool_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 60000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
