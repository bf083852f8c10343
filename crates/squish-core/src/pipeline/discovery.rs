//! Source tree discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::types::{SourceFormat, SourceImage};

/// Discovers source images under a root, skipping the pipeline's own subtrees.
pub struct FileDiscovery {
    source_formats: Vec<String>,
    excluded: Vec<PathBuf>,
}

/// Result of walking the source tree.
#[derive(Debug, Default)]
pub struct Discovered {
    /// Matching files, sorted by path
    pub files: Vec<SourceImage>,
    /// Directories or entries that could not be read
    pub warnings: Vec<String>,
}

impl FileDiscovery {
    /// Create a discovery instance for the given extensions.
    ///
    /// `excluded` roots (output, backup, temp) are pruned from the walk even
    /// when they live inside the source tree.
    pub fn new(source_formats: Vec<String>, excluded: Vec<PathBuf>) -> Self {
        let excluded = excluded.iter().map(|p| normalize(p)).collect();
        Self {
            source_formats,
            excluded,
        }
    }

    /// Recursively collect every supported file under `root`.
    ///
    /// A missing root yields an empty result. Unreadable entries become
    /// warnings and the walk continues.
    pub fn discover(&self, root: &Path) -> Discovered {
        let mut result = Discovered::default();
        if !root.exists() {
            tracing::debug!("Source root {:?} does not exist", root);
            return result;
        }
        let root = normalize(root);

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let where_ = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    let message = format!("Failed to read directory {where_}: {e}");
                    tracing::warn!("{message}");
                    result.warnings.push(message);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some((extension, format)) = self.match_format(entry.path()) else {
                continue;
            };
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    result
                        .warnings
                        .push(format!("Failed to stat {}: {e}", entry.path().display()));
                    continue;
                }
            };

            let path = entry.path().to_path_buf();
            let relative_path = path
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            result.files.push(SourceImage {
                name: entry.file_name().to_string_lossy().into_owned(),
                directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                relative_path,
                extension,
                format,
                size,
                path,
            });
        }

        // Sort by path for deterministic batching
        result.files.sort_by(|a, b| a.path.cmp(&b.path));
        result
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|ex| path.starts_with(ex))
    }

    /// Return the lowercased extension and format if the file is wanted.
    fn match_format(&self, path: &Path) -> Option<(String, SourceFormat)> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if !self
            .source_formats
            .iter()
            .any(|fmt| fmt.eq_ignore_ascii_case(&ext))
        {
            return None;
        }
        let format = SourceFormat::from_extension(&ext)?;
        Some((ext, format))
    }

    /// Get total size of all discovered files.
    pub fn total_size(files: &[SourceImage]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

/// Canonicalize when possible so relative and absolute config paths compare equal.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        ["jpg", "jpeg", "png"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_format() {
        let discovery = FileDiscovery::new(formats(), vec![]);

        assert!(discovery.match_format(Path::new("test.jpg")).is_some());
        assert!(discovery.match_format(Path::new("test.JPG")).is_some());
        assert_eq!(
            discovery.match_format(Path::new("test.JPEG")).unwrap().0,
            "jpeg"
        );
        // Known raster format but not configured
        assert!(discovery.match_format(Path::new("test.gif")).is_none());
        assert!(discovery.match_format(Path::new("test.txt")).is_none());
        assert!(discovery.match_format(Path::new("noext")).is_none());
    }

    #[test]
    fn test_discover_skips_output_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("gallery")).unwrap();
        std::fs::create_dir_all(root.join("optimized")).unwrap();
        std::fs::create_dir_all(root.join("backup/gallery")).unwrap();
        std::fs::write(root.join("a.jpg"), b"a").unwrap();
        std::fs::write(root.join("gallery/b.png"), b"bb").unwrap();
        std::fs::write(root.join("gallery/notes.txt"), b"x").unwrap();
        std::fs::write(root.join("optimized/a.jpg"), b"a").unwrap();
        std::fs::write(root.join("backup/gallery/b.png"), b"bb").unwrap();

        let discovery = FileDiscovery::new(
            formats(),
            vec![root.join("optimized"), root.join("backup")],
        );
        let found = discovery.discover(root);

        let rel: Vec<_> = found.files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(
            rel,
            vec![PathBuf::from("a.jpg"), PathBuf::from("gallery/b.png")]
        );
        assert!(found.warnings.is_empty());
        assert_eq!(FileDiscovery::total_size(&found.files), 3);

        let b = &found.files[1];
        assert_eq!(b.name, "b.png");
        assert_eq!(b.format, SourceFormat::Png);
        assert!(b.path.is_absolute());
        assert!(b.directory.ends_with("gallery"));
    }

    #[test]
    fn test_discover_missing_root_is_empty() {
        let discovery = FileDiscovery::new(formats(), vec![]);
        let found = discovery.discover(Path::new("/nonexistent/squish/root"));
        assert!(found.files.is_empty());
        assert!(found.warnings.is_empty());
    }
}
