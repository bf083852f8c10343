//! The codec capability used by the quality search and thumbnail generator.
//!
//! Two implementations ship: [`CwebpCodec`] shells out to `cwebp`, and
//! [`NativeWebpCodec`] links libwebp through the `webp` crate. The search loop
//! only sees `Arc<dyn Codec>`, so either (or a test stub) can be swapped in.

use async_trait::async_trait;
use image::imageops::FilterType;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{PipelineError, PipelineResult};

use super::tools::run_tool;

/// Parameters for a single encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeRequest {
    /// Lossy quality, 1-100
    pub quality: u8,
    /// Resize to this width first; height follows the aspect ratio
    pub width: Option<u32>,
}

impl EncodeRequest {
    /// Encode at `quality` without resizing.
    pub fn at_quality(quality: u8) -> Self {
        Self {
            quality,
            width: None,
        }
    }

    /// Encode at `quality`, scaled to `width`.
    pub fn scaled(quality: u8, width: u32) -> Self {
        Self {
            quality,
            width: Some(width),
        }
    }
}

/// Encodes an image file into the target codec's bytes.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Encode `input` according to `request`, returning the encoded bytes.
    async fn encode(&self, input: &Path, request: EncodeRequest) -> PipelineResult<Vec<u8>>;
}

/// `cwebp` subprocess codec. Writes to stdout so no scratch file is needed.
pub struct CwebpCodec {
    binary: String,
    method: u8,
    timeout_ms: u64,
}

impl CwebpCodec {
    pub fn new(binary: impl Into<String>, method: u8, timeout_ms: u64) -> Self {
        Self {
            binary: binary.into(),
            method,
            timeout_ms,
        }
    }

    fn build_args(&self, input: &Path, request: EncodeRequest) -> Vec<String> {
        let mut args = vec![
            "-quiet".to_string(),
            "-q".to_string(),
            request.quality.to_string(),
            "-m".to_string(),
            self.method.to_string(),
            "-af".to_string(),
        ];
        if let Some(width) = request.width {
            args.extend(["-resize".to_string(), width.to_string(), "0".to_string()]);
        }
        args.extend([
            input.to_string_lossy().into_owned(),
            "-o".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Codec for CwebpCodec {
    fn name(&self) -> &str {
        "cwebp"
    }

    async fn encode(&self, input: &Path, request: EncodeRequest) -> PipelineResult<Vec<u8>> {
        let args = self.build_args(input, request);
        let bytes = run_tool(
            &self.binary,
            &args,
            self.timeout_ms,
            input,
            "encode",
            |message| PipelineError::Codec {
                path: input.to_path_buf(),
                message,
            },
        )
        .await?;
        if bytes.is_empty() {
            return Err(PipelineError::Codec {
                path: input.to_path_buf(),
                message: "cwebp produced no output".to_string(),
            });
        }
        Ok(bytes)
    }
}

/// In-process libwebp codec. Decoding and encoding run on the blocking pool.
pub struct NativeWebpCodec {
    timeout_ms: u64,
}

impl NativeWebpCodec {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    fn encode_sync(input: &Path, request: EncodeRequest) -> PipelineResult<Vec<u8>> {
        let codec_err = |message: String| PipelineError::Codec {
            path: input.to_path_buf(),
            message,
        };

        let reader = image::ImageReader::open(input)
            .map_err(|e| codec_err(format!("Cannot open file: {e}")))?
            .with_guessed_format()
            .map_err(|e| codec_err(format!("Cannot detect image format: {e}")))?;
        if reader.format().is_none() {
            return Err(PipelineError::UnsupportedFormat {
                path: input.to_path_buf(),
                format: input
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }
        let image = reader.decode().map_err(|e| codec_err(e.to_string()))?;

        let image = match request.width {
            Some(width) => {
                let height = scaled_height(image.width(), image.height(), width);
                image.resize_exact(width, height, FilterType::Lanczos3)
            }
            None => image,
        };

        let quality = f32::from(request.quality);
        let encoded = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height()).encode(quality)
        } else {
            let rgb = image.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height()).encode(quality)
        };
        Ok(encoded.to_vec())
    }
}

#[async_trait]
impl Codec for NativeWebpCodec {
    fn name(&self) -> &str {
        "libwebp"
    }

    async fn encode(&self, input: &Path, request: EncodeRequest) -> PipelineResult<Vec<u8>> {
        let owned = input.to_path_buf();
        let result = timeout(
            Duration::from_millis(self.timeout_ms),
            tokio::task::spawn_blocking(move || Self::encode_sync(&owned, request)),
        )
        .await;

        match result {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e)) => Err(PipelineError::Codec {
                path: input.to_path_buf(),
                message: format!("Task join error: {e}"),
            }),
            Err(_) => Err(PipelineError::Timeout {
                path: input.to_path_buf(),
                stage: "encode".to_string(),
                timeout_ms: self.timeout_ms,
            }),
        }
    }
}

/// Height that keeps the aspect ratio at `target_width` (at least 1px).
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let h = (f64::from(height) * f64::from(target_width) / f64::from(width)).round();
    (h as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_gradient(path: &Path, w: u32, h: u32) {
        let img = ImageBuffer::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 128u8])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_cwebp_args() {
        let codec = CwebpCodec::new("cwebp", 6, 1000);
        let args = codec.build_args(Path::new("in.png"), EncodeRequest::at_quality(70));
        assert_eq!(
            args,
            vec!["-quiet", "-q", "70", "-m", "6", "-af", "in.png", "-o", "-"]
        );

        let args = codec.build_args(Path::new("in.png"), EncodeRequest::scaled(80, 300));
        assert!(args.windows(3).any(|w| w == ["-resize", "300", "0"]));
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(1000, 500, 300), 150);
        assert_eq!(scaled_height(3, 1, 1), 1);
        assert_eq!(scaled_height(0, 100, 10), 1);
    }

    #[tokio::test]
    async fn test_native_codec_produces_webp() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        write_gradient(&input, 64, 32);

        let codec = NativeWebpCodec::new(10_000);
        let bytes = codec
            .encode(&input, EncodeRequest::at_quality(80))
            .await
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn test_native_codec_scales_width() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        write_gradient(&input, 200, 100);

        let codec = NativeWebpCodec::new(10_000);
        let bytes = codec
            .encode(&input, EncodeRequest::scaled(80, 50))
            .await
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 25));
    }

    #[tokio::test]
    async fn test_native_codec_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.png");
        std::fs::write(&input, b"not an image").unwrap();

        let codec = NativeWebpCodec::new(10_000);
        let err = codec
            .encode(&input, EncodeRequest::at_quality(80))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Codec { .. }));
    }
}
