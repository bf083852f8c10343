//! Content hashing and the per-run duplicate registry.

use blake3::Hasher as Blake3Hasher;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tokio::sync::Mutex;

use crate::error::{PipelineError, PipelineResult};
use crate::types::SourceImage;

/// BLAKE3 content hashing for exact deduplication.
pub struct Hasher;

impl Hasher {
    /// Generate a BLAKE3 hash of file contents.
    ///
    /// Streams the file so large originals are never held in memory at once.
    pub fn content_hash(path: &Path) -> std::io::Result<String> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Blake3Hasher::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Generate a BLAKE3 hash from an in-memory byte buffer.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }

    /// Hash a file on the blocking pool so batch members don't stall the runtime.
    pub async fn hash_file(path: &Path) -> PipelineResult<String> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::content_hash(&owned))
            .await
            .map_err(|e| PipelineError::Hash {
                path: path.to_path_buf(),
                message: format!("Task join error: {e}"),
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
                _ => PipelineError::Hash {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                },
            })
    }
}

/// Maps content hash to the first file seen with it during one run.
///
/// Shared across all members of a batch; the check and the insert happen
/// under one lock so two identical files racing in the same batch can't both
/// register as originals.
#[derive(Default)]
pub struct DuplicateRegistry {
    seen: Mutex<HashMap<String, SourceImage>>,
}

impl DuplicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `image` under `hash`, or return the original it duplicates.
    pub async fn check_duplicate(&self, hash: &str, image: &SourceImage) -> Option<SourceImage> {
        let mut seen = self.seen.lock().await;
        match seen.get(hash) {
            Some(original) => Some(original.clone()),
            None => {
                seen.insert(hash.to_string(), image.clone());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceFormat;
    use std::path::PathBuf;

    fn source(name: &str) -> SourceImage {
        SourceImage {
            path: PathBuf::from(name),
            relative_path: PathBuf::from(name),
            name: name.to_string(),
            extension: "jpg".to_string(),
            format: SourceFormat::Jpeg,
            size: 10,
            directory: PathBuf::from("."),
        }
    }

    #[test]
    fn test_identical_content_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let b = nested.join("renamed.png");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let ha = Hasher::content_hash(&a).unwrap();
        let hb = Hasher::content_hash(&b).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(ha, Hasher::content_hash_from_bytes(b"same bytes"));
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(
            Hasher::content_hash_from_bytes(b"one"),
            Hasher::content_hash_from_bytes(b"two")
        );
    }

    #[tokio::test]
    async fn test_hash_file_missing_is_not_found() {
        let err = Hasher::hash_file(Path::new("/nonexistent/x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_registry_first_seen_wins() {
        let registry = DuplicateRegistry::new();
        assert!(registry.check_duplicate("h1", &source("a.jpg")).await.is_none());

        let original = registry.check_duplicate("h1", &source("b.jpg")).await;
        assert_eq!(original.unwrap().name, "a.jpg");

        // A third copy still points at the first one
        let original = registry.check_duplicate("h1", &source("c.jpg")).await;
        assert_eq!(original.unwrap().name, "a.jpg");

        assert!(registry.check_duplicate("h2", &source("d.jpg")).await.is_none());
        let original = registry.check_duplicate("h2", &source("e.jpg")).await;
        assert_eq!(original.unwrap().name, "d.jpg");
    }
}
