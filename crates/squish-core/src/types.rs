//! Core data types for the squish optimization pipeline.
//!
//! These types describe what a run discovers, what it produces, and the
//! counters it accumulates along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Raster formats accepted as optimization input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl SourceFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

/// The single output codec.
pub const TARGET_FORMAT: &str = "webp";

/// One discovered input file. Immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Absolute (or as-configured) path to the file
    pub path: PathBuf,

    /// Path relative to the configured source root
    pub relative_path: PathBuf,

    /// Just the filename portion
    pub name: String,

    /// Lowercased extension as found on disk ("jpg", "png", ...)
    pub extension: String,

    /// Format derived from the extension
    pub format: SourceFormat,

    /// File size in bytes
    pub size: u64,

    /// Containing directory
    pub directory: PathBuf,
}

/// Intrinsic properties of a source image.
///
/// Every field has a neutral default so a failed probe still yields a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Width in pixels (0 when unknown)
    pub width: u32,

    /// Height in pixels (0 when unknown)
    pub height: u32,

    /// Colorspace name ("sRGB", "Gray", ...)
    pub colorspace: String,

    /// Embedded quality estimate, 0 if the format carries none
    pub quality: u32,

    /// Compression scheme ("JPEG", "Zip", "LZW", ...)
    pub compression: String,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            colorspace: "Unknown".to_string(),
            quality: 0,
            compression: "Unknown".to_string(),
        }
    }
}

/// Link from a later-seen file to the first file sharing its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRecord {
    /// Source-relative path of the first file seen with this hash
    pub original: PathBuf,

    /// Source-relative path of the duplicate
    pub duplicate: PathBuf,

    /// Shared content hash
    pub hash: String,
}

/// A successfully encoded image. Never exceeds the configured byte cap.
#[derive(Debug, Clone)]
pub struct OptimizedArtifact {
    /// Final output path
    pub path: PathBuf,

    /// Encoded size in bytes
    pub size: u64,

    /// Ladder quality that satisfied the cap
    pub quality: u8,

    /// When the artifact was promoted
    pub processed_at: DateTime<Utc>,
}

impl OptimizedArtifact {
    /// Output format; always the pipeline's target codec.
    pub fn format(&self) -> &'static str {
        TARGET_FORMAT
    }

    /// Percent of bytes saved relative to `original_size`.
    pub fn compression_ratio(&self, original_size: u64) -> f64 {
        savings_percent(original_size, self.size)
    }
}

/// A responsive width variant derived from an optimized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailVariant {
    /// Target width in pixels
    pub width: u32,

    /// Where the variant was written
    pub path: PathBuf,

    /// Encoded size in bytes
    pub size: u64,
}

/// Counters accumulated by the optimizer over one run.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    /// Files picked up by the batch loop, duplicates included
    pub processed: u64,

    /// Files that produced an artifact
    pub optimized: u64,

    /// Files that failed
    pub failed: u64,

    /// Files recognized as content duplicates
    pub duplicates_found: u64,

    /// Files skipped because a previous run already optimized them
    pub skipped: u64,

    /// Thumbnail variants written
    pub thumbnails_generated: u64,

    /// Bytes of all non-duplicate sources handed to the encoder
    pub total_size_before: u64,

    /// Bytes of all artifacts produced
    pub total_size_after: u64,

    /// Wall time of the whole run
    pub elapsed: Duration,

    /// Per-file failure messages
    pub errors: Vec<String>,

    /// Non-fatal issues
    pub warnings: Vec<String>,
}

impl RunStatistics {
    /// Percent of bytes saved across the run.
    pub fn compression_ratio(&self) -> f64 {
        savings_percent(self.total_size_before, self.total_size_after)
    }

    /// Bytes saved across the run (0 if output grew).
    pub fn bytes_saved(&self) -> u64 {
        self.total_size_before.saturating_sub(self.total_size_after)
    }
}

fn savings_percent(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}
