//! Read-only audit of an output tree against the byte cap.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

use crate::types::{SourceFormat, TARGET_FORMAT};
use crate::units::format_bytes;

/// Report filename written next to the manifest.
pub const REPORT_FILE: &str = "validation-report.json";

/// Files the pipeline itself writes into the output root; never audited.
const SKIPPED_FILES: [&str; 2] = [crate::manifest::MANIFEST_FILE, REPORT_FILE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub oversized: usize,
    pub unsupported: usize,
    /// One decimal, e.g. `"87.5%"`
    pub pass_rate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversizedImage {
    pub path: String,
    pub size: String,
    pub limit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedImage {
    pub path: String,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssues {
    pub oversized_images: Vec<OversizedImage>,
    pub unsupported_formats: Vec<UnsupportedImage>,
    pub errors: Vec<String>,
}

/// PASS/FAIL audit of an output tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub summary: ValidationSummary,
    pub issues: ValidationIssues,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }
}

/// Checks every file under an output root for size and format.
pub struct OutputValidator {
    max_file_size: u64,
    accepted: Vec<SourceFormat>,
}

impl OutputValidator {
    /// `source_formats` are accepted alongside the target codec.
    pub fn new(max_file_size: u64, source_formats: &[String]) -> Self {
        let accepted = source_formats
            .iter()
            .filter_map(|ext| SourceFormat::from_extension(ext))
            .collect();
        Self {
            max_file_size,
            accepted,
        }
    }

    /// Audit `root`. Never modifies anything.
    ///
    /// A missing root is an empty, passing report.
    pub fn validate(&self, root: &Path) -> ValidationReport {
        let mut total = 0;
        let mut valid = 0;
        let mut issues = ValidationIssues::default();

        if root.exists() {
            for entry in WalkDir::new(root).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        issues.errors.push(format!("Validation failed: {e}"));
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if entry.depth() == 1 && SKIPPED_FILES.iter().any(|f| name == *f) {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        issues.errors.push(format!("Failed to stat {relative}: {e}"));
                        continue;
                    }
                };

                total += 1;
                if size > self.max_file_size {
                    issues.oversized_images.push(OversizedImage {
                        path: relative.clone(),
                        size: format_bytes(size),
                        limit: format_bytes(self.max_file_size),
                    });
                } else {
                    valid += 1;
                }

                let detected = sniff_format(entry.path());
                if !self.is_accepted(detected) {
                    let format = detected.map(str::to_string).unwrap_or_else(|| {
                        entry
                            .path()
                            .extension()
                            .map(|e| e.to_string_lossy().to_lowercase())
                            .unwrap_or_else(|| "unknown".to_string())
                    });
                    issues.unsupported_formats.push(UnsupportedImage {
                        path: relative,
                        format,
                    });
                }
            }
        } else {
            tracing::debug!("Output root {:?} does not exist", root);
        }

        let status = if issues.oversized_images.is_empty() {
            ValidationStatus::Pass
        } else {
            ValidationStatus::Fail
        };
        let pass_rate = if total > 0 {
            format!("{:.1}%", valid as f64 / total as f64 * 100.0)
        } else {
            "0%".to_string()
        };
        let recommendations = recommendations(total, &issues);

        ValidationReport {
            status,
            summary: ValidationSummary {
                total,
                valid,
                oversized: issues.oversized_images.len(),
                unsupported: issues.unsupported_formats.len(),
                pass_rate,
            },
            issues,
            recommendations,
        }
    }

    fn is_accepted(&self, detected: Option<&str>) -> bool {
        match detected {
            Some(TARGET_FORMAT) => true,
            Some(format) => SourceFormat::from_extension(format)
                .is_some_and(|f| self.accepted.contains(&f)),
            None => false,
        }
    }
}

fn recommendations(total: usize, issues: &ValidationIssues) -> Vec<String> {
    let mut out = Vec::new();
    if !issues.oversized_images.is_empty() {
        out.push(format!(
            "Optimize {} oversized images using the image optimizer",
            issues.oversized_images.len()
        ));
    }
    if !issues.unsupported_formats.is_empty() {
        out.push(format!(
            "Convert {} images to supported formats (WebP recommended)",
            issues.unsupported_formats.len()
        ));
    }
    if total == 0 {
        out.push("No images found. Check the source directory configuration.".to_string());
    }
    if out.is_empty() {
        out.push("All images meet the requirements. Great job!".to_string());
    }
    out
}

/// Identify a file's actual format from its leading bytes.
fn sniff_format(path: &Path) -> Option<&'static str> {
    let mut header = [0u8; 12];
    let mut file = std::fs::File::open(path).ok()?;
    let read = file.read(&mut header).ok()?;
    detect_format(&header[..read])
}

fn detect_format(header: &[u8]) -> Option<&'static str> {
    match header {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some("tiff"),
        [b'B', b'M', ..] => Some("bmp"),
        _ => None,
    }
}
