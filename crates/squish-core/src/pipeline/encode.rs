//! Quality-ladder search under a byte budget.
//!
//! Each rung is encoded into an anonymous candidate file next to the target.
//! The first candidate that fits is renamed onto the target; rejected ones
//! are unlinked when dropped, so neither a crash nor an early return leaves
//! a partial output behind.

use chrono::Utc;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, PipelineResult};
use crate::types::OptimizedArtifact;

use super::codec::{Codec, EncodeRequest};

/// Walks a descending quality ladder until an encode fits `max_bytes`.
pub struct QualitySearchEncoder {
    codec: Arc<dyn Codec>,
    ladder: Vec<u8>,
    max_bytes: u64,
}

impl QualitySearchEncoder {
    pub fn new(codec: Arc<dyn Codec>, ladder: Vec<u8>, max_bytes: u64) -> Self {
        Self {
            codec,
            ladder,
            max_bytes,
        }
    }

    /// Encode `input` to `target` at the highest ladder quality that fits.
    ///
    /// A failing rung is logged and the search moves on to the next one.
    /// When no rung fits, nothing is written and
    /// [`PipelineError::EncodingExhausted`] is returned.
    pub async fn encode(&self, input: &Path, target: &Path) -> PipelineResult<OptimizedArtifact> {
        let write_err = |message: String| PipelineError::Codec {
            path: input.to_path_buf(),
            message,
        };

        let target_dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| write_err(format!("Cannot create {}: {e}", target_dir.display())))?;

        let mut smallest: Option<u64> = None;
        let mut last_error = None;

        for &quality in &self.ladder {
            let bytes = match self
                .codec
                .encode(input, EncodeRequest::at_quality(quality))
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!("{} q{quality} failed: {e}", self.codec.name());
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let dir = target_dir.to_path_buf();
            let (candidate, size) =
                tokio::task::spawn_blocking(move || write_candidate(&dir, &bytes))
                    .await
                    .map_err(|e| write_err(format!("Task join error: {e}")))?
                    .map_err(|e| write_err(format!("Cannot write candidate: {e}")))?;

            if size > self.max_bytes {
                tracing::trace!(
                    "{} q{quality}: {size} bytes over budget {}",
                    input.display(),
                    self.max_bytes
                );
                smallest = Some(smallest.map_or(size, |s| s.min(size)));
                // Dropping the candidate unlinks it
                let _ = tokio::task::spawn_blocking(move || drop(candidate)).await;
                continue;
            }

            let promoted = target.to_path_buf();
            tokio::task::spawn_blocking(move || candidate.persist(promoted))
                .await
                .map_err(|e| write_err(format!("Task join error: {e}")))?
                .map_err(|e| write_err(format!("Cannot promote candidate: {}", e.error)))?;
            tracing::debug!("{} -> q{quality}, {size} bytes", input.display());

            return Ok(OptimizedArtifact {
                path: target.to_path_buf(),
                size,
                quality,
                processed_at: Utc::now(),
            });
        }

        Err(PipelineError::EncodingExhausted {
            path: input.to_path_buf(),
            max_bytes: self.max_bytes,
            attempts: self.ladder.len(),
            smallest,
            last_error,
        })
    }
}

/// Write one candidate next to the target and report its on-disk size.
fn write_candidate(dir: &Path, bytes: &[u8]) -> std::io::Result<(NamedTempFile, u64)> {
    let mut candidate = tempfile::Builder::new()
        .prefix(".candidate_")
        .suffix(".webp")
        .tempfile_in(dir)?;
    candidate.write_all(bytes)?;
    candidate.flush()?;
    let size = candidate.as_file().metadata()?.len();
    Ok((candidate, size))
}
