//! Responsive width variants derived from optimized artifacts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ThumbnailConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ThumbnailVariant, TARGET_FORMAT};

use super::codec::{Codec, EncodeRequest};

/// Subdirectory of the output root holding every variant.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Generates fixed-width variants of an optimized image.
pub struct ThumbnailGenerator {
    codec: Arc<dyn Codec>,
    config: ThumbnailConfig,
}

impl ThumbnailGenerator {
    /// Create a new thumbnail generator with the given configuration.
    pub fn new(codec: Arc<dyn Codec>, config: ThumbnailConfig) -> Self {
        Self { codec, config }
    }

    /// Where the `width` variant of an artifact lands under `output_root`.
    ///
    /// `optimized` is the artifact path relative to the output root;
    /// `gallery/beach.webp` yields `thumbnails/gallery/beach_<width>w.webp`.
    pub fn variant_path(output_root: &Path, optimized: &Path, width: u32) -> PathBuf {
        let stem = optimized
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut dir = output_root.join(THUMBNAIL_DIR);
        if let Some(parent) = optimized.parent() {
            dir.push(parent);
        }
        dir.join(format!("{stem}_{width}w.{TARGET_FORMAT}"))
    }

    /// Encode every configured width from the artifact at `optimized`.
    ///
    /// Widths are independent; a failed width becomes a warning naming
    /// `source_name` and the rest still run.
    pub async fn generate(
        &self,
        optimized: &Path,
        output_root: &Path,
        source_name: &str,
    ) -> (Vec<ThumbnailVariant>, Vec<String>) {
        let relative = match optimized.strip_prefix(output_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => optimized.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        let mut variants = Vec::with_capacity(self.config.widths.len());
        let mut warnings = Vec::new();

        for &width in &self.config.widths {
            let path = Self::variant_path(output_root, &relative, width);
            match self.generate_one(optimized, path, width).await {
                Ok(variant) => {
                    tracing::debug!("Generated thumbnail: {}", variant.path.display());
                    variants.push(variant);
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    warnings.push(format!(
                        "Failed to generate {width}w thumbnail for {source_name}"
                    ));
                }
            }
        }

        (variants, warnings)
    }

    async fn generate_one(
        &self,
        optimized: &Path,
        path: PathBuf,
        width: u32,
    ) -> PipelineResult<ThumbnailVariant> {
        let thumb_err = |message: String| PipelineError::Thumbnail {
            path: optimized.to_path_buf(),
            width,
            message,
        };

        let bytes = self
            .codec
            .encode(optimized, EncodeRequest::scaled(self.config.quality, width))
            .await
            .map_err(|e| thumb_err(e.to_string()))?;
        let size = bytes.len() as u64;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_variant(&target, &bytes))
            .await
            .map_err(|e| thumb_err(format!("Task join error: {e}")))?
            .map_err(|e| thumb_err(e.to_string()))?;

        Ok(ThumbnailVariant { width, size, path })
    }
}

/// Write `bytes` to `path` through a sibling temp file and rename.
fn write_variant(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
