//! Error types for the squish optimization pipeline.
//!
//! Only [`SetupError`] and [`ConfigError`] stop a run. [`PipelineError`]s are
//! scoped to a single file: the optimizer records them and moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for squish operations.
#[derive(Error, Debug)]
pub enum SquishError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fatal setup errors raised before discovery starts
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors that abort a run before any file is touched.
#[derive(Error, Debug)]
pub enum SetupError {
    /// One or more external tools are not installed
    #[error("Missing dependencies: {}\nInstall with: {install_hint}", .missing.join(", "))]
    MissingTools {
        missing: Vec<String>,
        install_hint: String,
    },

    /// A configured directory could not be created or written
    #[error("Cannot use directory {path}: {message}")]
    Directory { path: PathBuf, message: String },
}

/// Per-file pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading the file for hashing failed
    #[error("Hash error for {path}: {message}")]
    Hash { path: PathBuf, message: String },

    /// Metadata probe failed (callers downgrade this to a warning)
    #[error("Metadata extraction failed for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Resize step failed
    #[error("Failed to resize {path}: {message}")]
    Resize { path: PathBuf, message: String },

    /// A single codec invocation failed
    #[error("Codec error for {path}: {message}")]
    Codec { path: PathBuf, message: String },

    /// No quality level produced an output within the byte budget
    #[error(
        "Could not encode {path} under {max_bytes} bytes after {attempts} attempt(s){}{}",
        .smallest.map(|s| format!(" (smallest candidate: {s} bytes)")).unwrap_or_default(),
        .last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default()
    )]
    EncodingExhausted {
        path: PathBuf,
        max_bytes: u64,
        attempts: usize,
        smallest: Option<u64>,
        last_error: Option<String>,
    },

    /// One thumbnail width failed
    #[error("Thumbnail {width}w failed for {path}: {message}")]
    Thumbnail {
        path: PathBuf,
        width: u32,
        message: String,
    },

    /// Copying the original into the backup tree failed
    #[error("Backup failed for {path}: {message}")]
    Backup { path: PathBuf, message: String },

    /// External tool or blocking task timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience type alias for squish results.
pub type Result<T> = std::result::Result<T, SquishError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
