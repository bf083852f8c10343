//! Squish Core - batch image optimization under a hard byte budget.
//!
//! Squish walks a source tree, drops content duplicates, shrinks oversized
//! originals, and re-encodes every image to WebP at the highest quality that
//! fits the configured size cap. Each run ends with a JSON manifest of what
//! was produced and a read-only validation pass over the output tree.
//!
//! # Architecture
//!
//! ```text
//! Discover → Hash/Dedup → Backup → Probe → Resize → Quality search → Thumbnails
//!                                                                      ↓
//!                                              Validate output → Write manifest
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use squish_core::{Config, Optimizer, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> squish_core::Result<()> {
//!     let config = Config::load()?;
//!     let mut optimizer = Optimizer::from_config(config).await?;
//!
//!     let report = optimizer.run(RunOptions::default()).await?;
//!     println!("Optimized {} images", report.statistics.optimized);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod types;
pub mod units;

// Re-exports for convenient access
pub use config::{Backend, Config};
pub use error::{ConfigError, PipelineError, PipelineResult, Result, SetupError, SquishError};
pub use manifest::{ManifestEntry, RunManifest, MANIFEST_FILE};
pub use pipeline::{
    Codec, FileStatus, OutputValidator, Optimizer, RunEvent, RunOptions, RunReport, RunState,
    Toolchain, ValidationReport, ValidationStatus,
};
pub use types::{
    DuplicateRecord, ImageMetadata, OptimizedArtifact, RunStatistics, SourceFormat, SourceImage,
    ThumbnailVariant,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
