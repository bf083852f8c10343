//! The run manifest: per-image provenance plus frozen run statistics.
//!
//! Written once at the end of a run with a temp-file-and-rename, so readers
//! only ever see a complete manifest or the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{DuplicateRecord, ImageMetadata, OptimizedArtifact, RunStatistics, SourceImage};
use crate::units::format_percent;

/// Manifest filename inside the output root.
pub const MANIFEST_FILE: &str = "optimization-manifest.json";

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalRecord {
    /// Relative to the source root
    pub path: String,
    pub name: String,
    pub size: u64,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedRecord {
    /// Relative to the output root
    pub path: String,
    pub size: u64,
    pub format: String,
    /// Bytes saved, e.g. `"61.23%"`
    pub compression: String,
    pub quality: u8,
}

/// One optimized image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub original: OriginalRecord,
    pub optimized: OptimizedRecord,
    pub metadata: ImageMetadata,
    pub hash: String,
    pub processed_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(
        source: &SourceImage,
        artifact: &OptimizedArtifact,
        output_root: &Path,
        metadata: ImageMetadata,
        hash: String,
    ) -> Self {
        let optimized_path = artifact
            .path
            .strip_prefix(output_root)
            .unwrap_or(&artifact.path);
        Self {
            original: OriginalRecord {
                path: display_path(&source.relative_path),
                name: source.name.clone(),
                size: source.size,
                format: source.extension.clone(),
            },
            optimized: OptimizedRecord {
                path: display_path(optimized_path),
                size: artifact.size,
                format: artifact.format().to_string(),
                compression: format_percent(artifact.compression_ratio(source.size)),
                quality: artifact.quality,
            },
            metadata,
            hash,
            processed_at: artifact.processed_at,
        }
    }

    /// Absolute location of the optimized file under `output_root`.
    pub fn optimized_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.optimized.path)
    }
}

/// Serialized form of [`RunStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatistics {
    pub total_processed: u64,
    pub total_optimized: u64,
    pub total_failed: u64,
    pub duplicates_found: u64,
    pub skipped: u64,
    pub size_before: u64,
    pub size_after: u64,
    pub compression_ratio: String,
    /// Milliseconds
    pub processing_time: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<&RunStatistics> for ManifestStatistics {
    fn from(stats: &RunStatistics) -> Self {
        Self {
            total_processed: stats.processed,
            total_optimized: stats.optimized,
            total_failed: stats.failed,
            duplicates_found: stats.duplicates_found,
            skipped: stats.skipped,
            size_before: stats.total_size_before,
            size_after: stats.total_size_after,
            compression_ratio: format_percent(stats.compression_ratio()),
            processing_time: u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
            errors: stats.errors.clone(),
            warnings: stats.warnings.clone(),
        }
    }
}

/// The auditable record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub images: Vec<ManifestEntry>,
    pub duplicates: Vec<DuplicateRecord>,
    pub statistics: ManifestStatistics,
}

impl RunManifest {
    pub fn new(
        images: Vec<ManifestEntry>,
        duplicates: Vec<DuplicateRecord>,
        statistics: &RunStatistics,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            generated_at: Utc::now(),
            images,
            duplicates,
            statistics: statistics.into(),
        }
    }

    /// Path of the manifest inside `output_root`.
    pub fn path_in(output_root: &Path) -> PathBuf {
        output_root.join(MANIFEST_FILE)
    }

    /// Load the manifest from `output_root`, if one exists.
    pub fn load(output_root: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(output_root);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically write the manifest into `output_root`, returning its path.
    pub fn write(&self, output_root: &Path) -> Result<PathBuf> {
        let path = Self::path_in(output_root);
        write_json_atomic(&path, self)?;
        Ok(path)
    }

    /// Index entries by content hash.
    pub fn entries_by_hash(&self) -> HashMap<&str, &ManifestEntry> {
        self.images.iter().map(|e| (e.hash.as_str(), e)).collect()
    }
}

/// Write `value` as pretty JSON to `path` via a sibling temp file and rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Forward-slash path string for the manifest.
fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
