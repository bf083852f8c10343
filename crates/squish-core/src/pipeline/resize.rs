//! Downscaling oversized sources before encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageFormat;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use tempfile::TempPath;
use tokio::time::timeout;

use crate::config::ResizeConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageMetadata, SourceFormat, SourceImage};

use super::tools::run_tool;

/// Quality for JPEG intermediates; high enough that the re-encode is not the bottleneck.
const JPEG_INTERMEDIATE_QUALITY: u8 = 95;

/// True when either dimension exceeds its bound. Unknown (zero) dimensions never resize.
pub fn should_resize(meta: &ImageMetadata, bounds: ResizeConfig) -> bool {
    meta.width > bounds.max_width || meta.height > bounds.max_height
}

/// Largest size that fits inside `max_width` x `max_height` with the same aspect ratio.
///
/// Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (f64::from(max_width) / f64::from(width))
        .min(f64::from(max_height) / f64::from(height))
        .min(1.0);
    let w = (f64::from(width) * scale).round() as u32;
    let h = (f64::from(height) * scale).round() as u32;
    (w.max(1), h.max(1))
}

/// Writes a bounded copy of a source image into the temp root.
#[derive(Debug, Clone)]
pub enum Resizer {
    /// ImageMagick `convert` with the shrink-only `>` geometry flag
    Convert { binary: String, timeout_ms: u64 },
    /// `image` crate decode and Lanczos3 resample
    Native { timeout_ms: u64 },
}

impl Resizer {
    /// Resize `image` to fit `bounds`, returning the intermediate path.
    ///
    /// The intermediate is removed when the returned [`TempPath`] is dropped.
    pub async fn resize(
        &self,
        image: &SourceImage,
        bounds: ResizeConfig,
        temp_dir: &Path,
    ) -> PipelineResult<TempPath> {
        let resize_err = |message: String| PipelineError::Resize {
            path: image.path.clone(),
            message,
        };

        tokio::fs::create_dir_all(temp_dir)
            .await
            .map_err(|e| resize_err(format!("Cannot create temp dir: {e}")))?;

        match self {
            Self::Convert { binary, timeout_ms } => {
                let target = scratch_file(temp_dir, &image.extension)
                    .map_err(|e| resize_err(e.to_string()))?;
                let geometry = format!("{}x{}>", bounds.max_width, bounds.max_height);
                let args = [
                    image.path.as_os_str(),
                    "-resize".as_ref(),
                    geometry.as_ref(),
                    target.as_os_str(),
                ];
                run_tool(binary, args, *timeout_ms, &image.path, "resize", resize_err).await?;
                Ok(target)
            }
            Self::Native { timeout_ms } => {
                let extension = match image.format {
                    SourceFormat::Jpeg => "jpg",
                    _ => "png",
                };
                let target =
                    scratch_file(temp_dir, extension).map_err(|e| resize_err(e.to_string()))?;

                let source = image.path.clone();
                let out = target.to_path_buf();
                let format = image.format;
                let task = tokio::task::spawn_blocking(move || {
                    resize_native(&source, &out, format, bounds)
                });

                match timeout(Duration::from_millis(*timeout_ms), task).await {
                    Ok(Ok(Ok(()))) => Ok(target),
                    Ok(Ok(Err(message))) => Err(resize_err(message)),
                    Ok(Err(e)) => Err(resize_err(format!("Task join error: {e}"))),
                    Err(_) => Err(PipelineError::Timeout {
                        path: image.path.clone(),
                        stage: "resize".to_string(),
                        timeout_ms: *timeout_ms,
                    }),
                }
            }
        }
    }
}

/// Reserve a uniquely named file in `dir`.
fn scratch_file(dir: &Path, extension: &str) -> std::io::Result<TempPath> {
    let suffix = format!(".{extension}");
    Ok(tempfile::Builder::new()
        .prefix("resized_")
        .suffix(&suffix)
        .tempfile_in(dir)?
        .into_temp_path())
}

fn resize_native(
    source: &Path,
    out: &Path,
    format: SourceFormat,
    bounds: ResizeConfig,
) -> Result<(), String> {
    let img = image::ImageReader::open(source)
        .map_err(|e| format!("Cannot open file: {e}"))?
        .with_guessed_format()
        .map_err(|e| format!("Cannot detect image format: {e}"))?
        .decode()
        .map_err(|e| e.to_string())?;

    let (w, h) = fit_within(img.width(), img.height(), bounds.max_width, bounds.max_height);
    let resized = img.resize_exact(w, h, FilterType::Lanczos3);

    match format {
        SourceFormat::Jpeg => {
            let file = File::create(out).map_err(|e| e.to_string())?;
            let mut encoder =
                JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_INTERMEDIATE_QUALITY);
            encoder
                .encode_image(&resized.to_rgb8())
                .map_err(|e| e.to_string())
        }
        _ if resized.color().has_alpha() => resized
            .to_rgba8()
            .save_with_format(out, ImageFormat::Png)
            .map_err(|e| e.to_string()),
        _ => resized
            .to_rgb8()
            .save_with_format(out, ImageFormat::Png)
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn meta(width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            width,
            height,
            ..Default::default()
        }
    }

    #[test]
    fn test_should_resize() {
        let bounds = ResizeConfig::default();
        assert!(should_resize(&meta(3000, 2000), bounds));
        assert!(should_resize(&meta(1000, 1500), bounds));
        assert!(!should_resize(&meta(1920, 1080), bounds));
        assert!(!should_resize(&meta(800, 600), bounds));
        assert!(!should_resize(&ImageMetadata::default(), bounds));
    }

    #[test]
    fn test_fit_within_preserves_aspect() {
        assert_eq!(fit_within(3000, 2000, 1920, 1080), (1620, 1080));
        assert_eq!(fit_within(4000, 1000, 1920, 1080), (1920, 480));
        assert_eq!(fit_within(800, 600, 1920, 1080), (800, 600));
        assert_eq!(fit_within(10000, 1, 100, 100), (100, 1));
    }

    #[tokio::test]
    async fn test_native_resize_respects_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        ImageBuffer::from_pixel(300, 200, Rgb([50u8, 100, 150]))
            .save(&path)
            .unwrap();

        let source = SourceImage {
            path: path.clone(),
            relative_path: PathBuf::from("wide.png"),
            name: "wide.png".into(),
            extension: "png".into(),
            format: SourceFormat::Png,
            size: std::fs::metadata(&path).unwrap().len(),
            directory: dir.path().to_path_buf(),
        };
        let bounds = ResizeConfig {
            max_width: 192,
            max_height: 108,
        };
        let temp_root = dir.path().join("tmp");

        let resized = Resizer::Native { timeout_ms: 10_000 }
            .resize(&source, bounds, &temp_root)
            .await
            .unwrap();
        let out = image::open(&resized).unwrap();
        assert_eq!((out.width(), out.height()), (162, 108));

        let kept = resized.to_path_buf();
        drop(resized);
        assert!(!kept.exists());
    }

    proptest! {
        #[test]
        fn prop_fit_within_stays_inside_and_keeps_ratio(
            width in 1u32..12_000,
            height in 1u32..12_000,
            max_width in 1u32..4_000,
            max_height in 1u32..4_000,
        ) {
            let (w, h) = fit_within(width, height, max_width, max_height);

            prop_assert!(w >= 1 && h >= 1);
            prop_assert!(w <= width && h <= height);
            if width > max_width || height > max_height {
                prop_assert!(w <= max_width && h <= max_height);
            }
            // Cross-multiplied ratio error is bounded by rounding on each side
            let skew = (u64::from(w) * u64::from(height)).abs_diff(u64::from(h) * u64::from(width));
            prop_assert!(skew <= u64::from(width) + u64::from(height));
        }
    }
}
