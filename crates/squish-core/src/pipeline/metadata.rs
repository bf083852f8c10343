//! Header-level metadata probing.
//!
//! Neither probe decodes pixel data; under batch concurrency the bitmap is
//! the dominant memory cost, so only the container header is read here.

use image::{ColorType, ImageDecoder, ImageFormat};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::ImageMetadata;

use super::tools::run_tool;

/// ImageMagick format string: width, height, colorspace, quality, compression.
const IDENTIFY_FORMAT: &str = "%w,%h,%[colorspace],%Q,%[compression]";

/// Reads intrinsic image properties.
#[derive(Debug, Clone)]
pub enum MetadataInspector {
    /// ImageMagick `identify`
    Identify { binary: String, timeout_ms: u64 },
    /// `image` crate header reader
    Header,
}

impl MetadataInspector {
    /// Probe `path`.
    ///
    /// Errors are meant to be downgraded by the caller; see [`Self::inspect_or_default`].
    pub async fn inspect(&self, path: &Path) -> PipelineResult<ImageMetadata> {
        match self {
            Self::Identify { binary, timeout_ms } => {
                // [0] limits animated GIFs and multi-page TIFFs to the first frame
                let target = format!("{}[0]", path.display());
                let stdout = run_tool(
                    binary,
                    ["-format", IDENTIFY_FORMAT, target.as_str()],
                    *timeout_ms,
                    path,
                    "metadata",
                    |message| PipelineError::Metadata {
                        path: path.to_path_buf(),
                        message,
                    },
                )
                .await?;
                let text = String::from_utf8_lossy(&stdout);
                parse_identify(&text).ok_or_else(|| PipelineError::Metadata {
                    path: path.to_path_buf(),
                    message: format!("Unexpected identify output: {:?}", text.trim()),
                })
            }
            Self::Header => {
                let owned = path.to_path_buf();
                tokio::task::spawn_blocking(move || read_header(&owned))
                    .await
                    .map_err(|e| PipelineError::Metadata {
                        path: path.to_path_buf(),
                        message: format!("Task join error: {e}"),
                    })?
            }
        }
    }

    /// Probe `path`, falling back to [`ImageMetadata::default`] on failure.
    ///
    /// The second element carries the warning to record when the probe failed.
    pub async fn inspect_or_default(&self, path: &Path) -> (ImageMetadata, Option<String>) {
        match self.inspect(path).await {
            Ok(meta) => (meta, None),
            Err(e) => {
                tracing::warn!("{e}");
                (ImageMetadata::default(), Some(e.to_string()))
            }
        }
    }
}

/// Parse a line produced by [`IDENTIFY_FORMAT`].
fn parse_identify(output: &str) -> Option<ImageMetadata> {
    let line = output.lines().next()?.trim();
    let mut parts = line.splitn(5, ',');
    let width = parts.next()?.trim().parse().ok()?;
    let height = parts.next()?.trim().parse().ok()?;
    let colorspace = non_empty_or_unknown(parts.next());
    let quality = parts
        .next()
        .and_then(|q| q.trim().parse().ok())
        .unwrap_or(0);
    let compression = non_empty_or_unknown(parts.next());

    Some(ImageMetadata {
        width,
        height,
        colorspace,
        quality,
        compression,
    })
}

fn non_empty_or_unknown(field: Option<&str>) -> String {
    match field.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "Unknown".to_string(),
    }
}

fn read_header(path: &Path) -> PipelineResult<ImageMetadata> {
    let meta_err = |message: String| PipelineError::Metadata {
        path: path.to_path_buf(),
        message,
    };

    let reader = image::ImageReader::open(path)
        .map_err(|e| meta_err(format!("Cannot open file: {e}")))?
        .with_guessed_format()
        .map_err(|e| meta_err(format!("Cannot detect image format: {e}")))?;
    let format = reader.format();
    let decoder = reader.into_decoder().map_err(|e| meta_err(e.to_string()))?;
    let (width, height) = decoder.dimensions();

    Ok(ImageMetadata {
        width,
        height,
        colorspace: colorspace_name(decoder.color_type()).to_string(),
        quality: 0,
        compression: format.map(compression_name).unwrap_or("Unknown").to_string(),
    })
}

/// Colorspace names as ImageMagick reports them.
fn colorspace_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => "Gray",
        _ => "sRGB",
    }
}

/// Compression scheme names as ImageMagick reports them.
fn compression_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::Png => "Zip",
        ImageFormat::Gif => "LZW",
        ImageFormat::Bmp => "None",
        ImageFormat::WebP => "WebP",
        _ => "Unknown",
    }
}
